// text.rs — Line-oriented textual rendering
//
// Each instruction prints as one line:
//
//   [ROOT ]%<name> = <shape> <opcode>(<operands>)[, <key>=<value>]*
//
// The common part (name, shape, opcode, operands) is produced here for every
// opcode; the trailing attributes come from `Instruction::render_attributes`,
// which never mentions operand identities so that renamed graphs diff cleanly.
//
// Canonical printing lays computations out callees first and names them by
// content: `comp_<k>` is the k-th distinct body, and a computation whose
// body (with callee labels already substituted) matches an earlier one is
// printed once and shares its label.

use std::collections::HashMap;
use std::fmt::Write;

use crate::attrs::Attributes;
use crate::id::{ComputationId, InstrId};
use crate::instruction::{GraphContext, Instruction};
use crate::module::Module;

// ── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    /// Prefix each operand with its shape.
    pub print_operand_shape: bool,
    /// Rename instructions `tmp_<k>` (post-order position within their
    /// computation) and computations `comp_<k>` (distinct bodies, callees
    /// first).
    pub canonicalize_names: bool,
    /// Print optimizer hints such as `in_place=true` on slices.
    pub print_backend_hints: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        PrintOptions {
            print_operand_shape: true,
            canonicalize_names: false,
            print_backend_hints: false,
        }
    }
}

impl PrintOptions {
    /// Naming-independent form: two structurally equal modules built in the
    /// same order print identically.
    pub fn canonical() -> Self {
        PrintOptions {
            print_operand_shape: false,
            canonicalize_names: true,
            print_backend_hints: false,
        }
    }

    pub fn with_operand_shapes(mut self, on: bool) -> Self {
        self.print_operand_shape = on;
        self
    }

    pub fn with_backend_hints(mut self, on: bool) -> Self {
        self.print_backend_hints = on;
        self
    }
}

// ── Attributes ──────────────────────────────────────────────────────────────

fn join_ints(values: &[i64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("{{{}}}", parts.join(","))
}

fn computation_label(
    ctx: &dyn GraphContext,
    id: ComputationId,
    options: &PrintOptions,
) -> String {
    if options.canonicalize_names {
        format!("%comp_{}", id.0)
    } else {
        format!("%{}", ctx.computation_name(id).unwrap_or("<unknown>"))
    }
}

impl Instruction {
    /// Opcode-specific `key=value` attributes, in a fixed order.
    pub fn render_attributes(&self, ctx: &dyn GraphContext, options: &PrintOptions) -> Vec<String> {
        self.attributes_with(options, &|id| computation_label(ctx, id, options))
    }

    fn attributes_with(
        &self,
        options: &PrintOptions,
        label: &dyn Fn(ComputationId) -> String,
    ) -> Vec<String> {
        match self.attributes() {
            Attributes::None | Attributes::Parameter { .. } | Attributes::Constant { .. } => {
                Vec::new()
            }
            Attributes::BatchNorm(bn) => vec![
                format!("epsilon={}", bn.epsilon),
                format!("feature_index={}", bn.feature_index),
            ],
            Attributes::Fft(fft) => vec![
                format!("fft_type={}", fft.fft_type),
                format!("fft_length={}", join_ints(&fft.fft_length)),
            ],
            Attributes::Channel(ch) => vec![format!("channel_id={}", ch.channel_id)],
            Attributes::Dimensions(dims) => vec![format!("dimensions={}", join_ints(dims))],
            Attributes::Reduce(r) => vec![
                format!("dimensions={}", join_ints(&r.dimensions)),
                format!("to_apply={}", label(r.to_apply)),
            ],
            Attributes::Map(m) => vec![
                format!("dimensions={}", join_ints(&m.dimensions)),
                format!("to_apply={}", label(m.to_apply)),
            ],
            Attributes::Slice(s) => {
                let omit_stride = s.strides.iter().all(|&st| st == 1);
                let ranges: Vec<String> = (0..s.starts.len())
                    .map(|i| {
                        if omit_stride {
                            format!("[{}:{}]", s.starts[i], s.limits[i])
                        } else {
                            format!("[{}:{}:{}]", s.starts[i], s.limits[i], s.strides[i])
                        }
                    })
                    .collect();
                let mut out = vec![format!("slice={{{}}}", ranges.join(", "))];
                if options.print_backend_hints && s.in_place {
                    out.push("in_place=true".to_string());
                }
                out
            }
        }
    }
}

// ── Lines ───────────────────────────────────────────────────────────────────

struct Printer<'a> {
    module: &'a Module,
    options: &'a PrintOptions,
    names: HashMap<InstrId, String>,
    /// Canonical computation labels; empty unless canonicalizing.
    labels: &'a HashMap<ComputationId, String>,
}

impl<'a> Printer<'a> {
    fn new(
        module: &'a Module,
        options: &'a PrintOptions,
        computation: ComputationId,
        labels: &'a HashMap<ComputationId, String>,
    ) -> Self {
        let names = if options.canonicalize_names {
            module
                .post_order(computation)
                .into_iter()
                .enumerate()
                .map(|(k, id)| (id, format!("tmp_{}", k)))
                .collect()
        } else {
            module.names_of(computation)
        };
        Printer {
            module,
            options,
            names,
            labels,
        }
    }

    fn computation(&self, id: ComputationId) -> String {
        match self.labels.get(&id) {
            Some(label) => format!("%{}", label),
            None => computation_label(self.module, id, self.options),
        }
    }

    fn name(&self, id: InstrId) -> String {
        match self.names.get(&id) {
            Some(name) => format!("%{}", name),
            None => format!("%<{}>", id),
        }
    }

    fn line(&self, id: InstrId, is_root: bool) -> String {
        let Some(instr) = self.module.instruction(id) else {
            return format!("{} = <removed>", self.name(id));
        };
        let mut out = String::new();
        if is_root {
            out.push_str("ROOT ");
        }
        let _ = write!(out, "{} = {} {}(", self.name(id), instr.shape(), instr.opcode());
        match instr.attributes() {
            Attributes::Parameter { number } => {
                let _ = write!(out, "{}", number);
            }
            Attributes::Constant { value } => {
                let _ = write!(out, "{}", value);
            }
            _ => {
                let operands: Vec<String> = instr
                    .operands()
                    .iter()
                    .map(|&o| self.operand(o))
                    .collect();
                out.push_str(&operands.join(", "));
            }
        }
        out.push(')');
        for attr in instr.attributes_with(self.options, &|id| self.computation(id)) {
            out.push_str(", ");
            out.push_str(&attr);
        }
        out
    }

    fn operand(&self, id: InstrId) -> String {
        match self.module.instruction(id) {
            Some(x) if self.options.print_operand_shape => format!("{} {}", x.shape(), self.name(id)),
            _ => self.name(id),
        }
    }
}

// ── Canonical layout ────────────────────────────────────────────────────────

struct CanonicalLayout {
    labels: HashMap<ComputationId, String>,
    blocks: Vec<String>,
}

fn canonical_layout(module: &Module, options: &PrintOptions) -> CanonicalLayout {
    let mut labels = HashMap::new();
    let mut blocks = Vec::new();
    let mut seen: HashMap<(bool, String), String> = HashMap::new();
    for comp in module.computation_post_order() {
        let is_entry = module.entry() == Some(comp);
        let body = body_to_string(module, comp, options, &labels);
        if let Some(label) = seen.get(&(is_entry, body.clone())) {
            labels.insert(comp, label.clone());
            continue;
        }
        let label = format!("comp_{}", blocks.len());
        blocks.push(block(is_entry, &label, &body));
        seen.insert((is_entry, body), label.clone());
        labels.insert(comp, label);
    }
    CanonicalLayout { labels, blocks }
}

// ── Blocks ──────────────────────────────────────────────────────────────────

fn body_to_string(
    module: &Module,
    computation: ComputationId,
    options: &PrintOptions,
    labels: &HashMap<ComputationId, String>,
) -> String {
    let root = module.computation(computation).and_then(|c| c.root());
    let printer = Printer::new(module, options, computation, labels);
    let mut out = String::new();
    for id in module.post_order(computation) {
        let _ = writeln!(out, "  {}", printer.line(id, root == Some(id)));
    }
    out
}

fn block(is_entry: bool, label: &str, body: &str) -> String {
    let entry = if is_entry { "ENTRY " } else { "" };
    format!("{}{} {{\n{}}}\n", entry, label, body)
}

// ── Public entry points ─────────────────────────────────────────────────────

/// One instruction line, without the `ROOT` marker.
pub fn instruction_to_string(module: &Module, id: InstrId, options: &PrintOptions) -> String {
    let Some(computation) = module.parent(id) else {
        return format!("%<{}> = <removed>", id);
    };
    let labels = if options.canonicalize_names {
        canonical_layout(module, options).labels
    } else {
        HashMap::new()
    };
    Printer::new(module, options, computation, &labels).line(id, false)
}

/// A computation block in post-order, root marked.
pub fn computation_to_string(
    module: &Module,
    computation: ComputationId,
    options: &PrintOptions,
) -> String {
    let Some(comp) = module.computation(computation) else {
        return String::new();
    };
    let is_entry = module.entry() == Some(computation);
    if options.canonicalize_names {
        let layout = canonical_layout(module, options);
        let label = layout
            .labels
            .get(&computation)
            .cloned()
            .unwrap_or_else(|| format!("comp_{}", computation.0));
        let body = body_to_string(module, computation, options, &layout.labels);
        return block(is_entry, &label, &body);
    }
    let body = body_to_string(module, computation, options, &HashMap::new());
    block(is_entry, comp.name(), &body)
}

/// The whole module, callees before callers, separated by blank lines.
/// Canonical output prints each distinct computation body once.
pub fn module_to_string(module: &Module, options: &PrintOptions) -> String {
    if options.canonicalize_names {
        let mut out = "HloModule\n".to_string();
        for b in canonical_layout(module, options).blocks {
            out.push('\n');
            out.push_str(&b);
        }
        return out;
    }
    let mut out = format!("HloModule {}\n", module.name());
    for comp in module.computations() {
        out.push('\n');
        out.push_str(&computation_to_string(module, comp.id(), options));
    }
    out
}
