// hlir — instruction node model for a tensor dataflow IR
//
// Library root. Nodes (instruction.rs) are built through validated factories
// (build.rs), owned by a `Module` arena (module.rs), compared structurally
// (equality.rs), printed (text.rs) and serialized (wire.rs).

pub mod attrs;
pub mod build;
pub mod equality;
pub mod error;
pub mod fingerprint;
pub mod id;
pub mod instruction;
pub mod module;
pub mod opcode;
pub mod shape;
pub mod text;
pub mod wire;
