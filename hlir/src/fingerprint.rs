// fingerprint.rs — Content hash of a module
//
// SHA-256 over the canonical text (`PrintOptions::canonical()`), so the hash
// ignores module, computation and instruction names and changes with
// any opcode, shape, operand or attribute. Optimizer hints are excluded.
// Identical computation bodies print once, so a body shared by two callers
// hashes the same as two copies of it.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::module::Module;
use crate::text::{module_to_string, PrintOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub digest: [u8; 32],
    pub hlir_version: &'static str,
}

impl Fingerprint {
    /// Hex string of the digest (64 characters).
    pub fn hex(&self) -> String {
        bytes_to_hex(&self.digest)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

fn bytes_to_hex(bytes: &[u8; 32]) -> String {
    let mut s = String::with_capacity(64);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(s, "{:02x}", b);
    }
    s
}

pub fn fingerprint(module: &Module) -> Fingerprint {
    let canonical = module_to_string(module, &PrintOptions::canonical());
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    Fingerprint {
        digest,
        hlir_version: env!("CARGO_PKG_VERSION"),
    }
}
