// module.rs — Minimal graph container for instructions
//
// Owns an arena of instruction slots and the computations that group them.
// Maintains operand→user back-edges, resolves handles for the node contract
// (`GraphContext`), and performs clone-and-replace rewrites.
//
// Preconditions: instructions come from the factories in build.rs, built
//   against this module as their context.
// Postconditions: every live operand handle resolves to a live slot in the
//   same computation; `users` mirrors the operand lists.
// Failure modes: foreign or dead handles, removing a used instruction, and
//   channel pairing violations → `BuildError`.
// Side effects: `debug!` logging of graph edits.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use log::debug;

use crate::error::BuildError;
use crate::id::{ComputationId, IdAllocator, InstrId};
use crate::instruction::{GraphContext, Instruction};
use crate::opcode::Opcode;
use crate::text::{module_to_string, PrintOptions};

// ── Computation ─────────────────────────────────────────────────────────────

/// A named instruction DAG with numbered parameters and a root.
#[derive(Debug, Clone)]
pub struct Computation {
    id: ComputationId,
    name: String,
    /// Insertion order.
    instructions: Vec<InstrId>,
    parameters: BTreeMap<i64, InstrId>,
    root: Option<InstrId>,
}

impl Computation {
    pub fn id(&self) -> ComputationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[InstrId] {
        &self.instructions
    }

    /// Parameter instructions ordered by parameter number.
    pub fn parameters(&self) -> Vec<InstrId> {
        self.parameters.values().copied().collect()
    }

    pub fn parameter(&self, number: i64) -> Option<InstrId> {
        self.parameters.get(&number).copied()
    }

    pub fn root(&self) -> Option<InstrId> {
        self.root
    }
}

// ── Module ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Slot {
    instr: Instruction,
    name: String,
    computation: ComputationId,
    users: Vec<InstrId>,
}

/// The send/recv halves found for one channel id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPair {
    pub channel_id: i64,
    pub send: Option<InstrId>,
    pub recv: Option<InstrId>,
}

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    slots: Vec<Option<Slot>>,
    computations: Vec<Computation>,
    entry: Option<ComputationId>,
    ids: IdAllocator,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            slots: Vec::new(),
            computations: Vec::new(),
            entry: None,
            ids: IdAllocator::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Computations ────────────────────────────────────────────────────

    pub fn add_computation(&mut self, name: impl Into<String>) -> ComputationId {
        let id = self.ids.alloc_computation();
        self.computations.push(Computation {
            id,
            name: name.into(),
            instructions: Vec::new(),
            parameters: BTreeMap::new(),
            root: None,
        });
        id
    }

    /// Computations in creation order.
    pub fn computations(&self) -> &[Computation] {
        &self.computations
    }

    pub fn computation(&self, id: ComputationId) -> Option<&Computation> {
        self.computations.get(id.index())
    }

    fn computation_mut(&mut self, id: ComputationId) -> Result<&mut Computation, BuildError> {
        self.computations
            .get_mut(id.index())
            .ok_or(BuildError::UnknownComputation(id))
    }

    /// The entry computation: the one set explicitly, else the last created.
    pub fn entry(&self) -> Option<ComputationId> {
        self.entry.or_else(|| self.computations.last().map(|c| c.id))
    }

    pub fn set_entry(&mut self, id: ComputationId) -> Result<(), BuildError> {
        self.computation(id)
            .ok_or(BuildError::UnknownComputation(id))?;
        self.entry = Some(id);
        Ok(())
    }

    // ── Instructions ────────────────────────────────────────────────────

    pub fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        self.slot(id).map(|s| &s.instr)
    }

    pub fn instruction_name(&self, id: InstrId) -> Option<&str> {
        self.slot(id).map(|s| s.name.as_str())
    }

    pub fn users(&self, id: InstrId) -> &[InstrId] {
        self.slot(id).map(|s| s.users.as_slice()).unwrap_or(&[])
    }

    /// The computation an instruction belongs to.
    pub fn parent(&self, id: InstrId) -> Option<ComputationId> {
        self.slot(id).map(|s| s.computation)
    }

    /// Live instruction handles in allocation order.
    pub fn instruction_ids(&self) -> impl Iterator<Item = InstrId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_some())
            .map(|(i, _)| InstrId(i as u32))
    }

    fn slot(&self, id: InstrId) -> Option<&Slot> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    fn slot_mut(&mut self, id: InstrId) -> Result<&mut Slot, BuildError> {
        self.slots
            .get_mut(id.index())
            .and_then(|s| s.as_mut())
            .ok_or(BuildError::UnknownInstruction(id))
    }

    /// Add an instruction named `<opcode>.<id>`. It becomes the root of
    /// `computation`.
    pub fn add_instruction(
        &mut self,
        computation: ComputationId,
        instr: Instruction,
    ) -> Result<InstrId, BuildError> {
        let name = format!("{}.{}", instr.opcode(), self.slots.len());
        self.add_named_instruction(computation, name, instr)
    }

    /// Build with `factory` against this module, then add the result.
    pub fn add_with(
        &mut self,
        computation: ComputationId,
        factory: impl FnOnce(&Module) -> Result<Instruction, BuildError>,
    ) -> Result<InstrId, BuildError> {
        let instr = factory(self)?;
        self.add_instruction(computation, instr)
    }

    pub fn add_named_instruction(
        &mut self,
        computation: ComputationId,
        name: impl Into<String>,
        instr: Instruction,
    ) -> Result<InstrId, BuildError> {
        self.computation(computation)
            .ok_or(BuildError::UnknownComputation(computation))?;
        self.check_operands_local(computation, instr.operands())?;
        if let Some(number) = instr.parameter_number() {
            if self.computations[computation.index()]
                .parameters
                .contains_key(&number)
            {
                return Err(BuildError::InvalidAttribute {
                    opcode: Opcode::Parameter,
                    message: format!("duplicate parameter number {}", number),
                });
            }
        }

        let id = self.ids.alloc_instr();
        debug_assert_eq!(id.index(), self.slots.len());
        self.link_users(id, instr.operands());
        let comp = self.computation_mut(computation)?;
        comp.instructions.push(id);
        if let Some(number) = instr.parameter_number() {
            comp.parameters.insert(number, id);
        }
        comp.root = Some(id);
        self.slots.push(Some(Slot {
            instr,
            name: name.into(),
            computation,
            users: Vec::new(),
        }));
        Ok(id)
    }

    pub fn set_root(&mut self, computation: ComputationId, id: InstrId) -> Result<(), BuildError> {
        if self.parent(id) != Some(computation) {
            return Err(BuildError::ForeignOperand {
                operand: id,
                computation,
            });
        }
        self.computation_mut(computation)?.root = Some(id);
        Ok(())
    }

    /// Update the in-place hint of a slice. `None` if `id` is not a live slice.
    pub fn set_in_place_slice(&mut self, id: InstrId, value: bool) -> Option<bool> {
        let slot = self.slots.get_mut(id.index())?.as_mut()?;
        slot.instr.set_in_place_slice(value)
    }

    fn check_operands_local(
        &self,
        computation: ComputationId,
        operands: &[InstrId],
    ) -> Result<(), BuildError> {
        for &operand in operands {
            match self.parent(operand) {
                None => return Err(BuildError::UnknownInstruction(operand)),
                Some(c) if c != computation => {
                    return Err(BuildError::ForeignOperand {
                        operand,
                        computation,
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    fn link_users(&mut self, user: InstrId, operands: &[InstrId]) {
        for &operand in operands {
            if let Some(Some(slot)) = self.slots.get_mut(operand.index()) {
                if !slot.users.contains(&user) {
                    slot.users.push(user);
                }
            }
        }
    }

    fn unlink_users(&mut self, user: InstrId, operands: &[InstrId]) {
        for &operand in operands {
            if let Some(Some(slot)) = self.slots.get_mut(operand.index()) {
                slot.users.retain(|&u| u != user);
            }
        }
    }

    // ── Rewrites ────────────────────────────────────────────────────────

    /// Replace the node at `id` by a clone of itself over `new_operands`,
    /// keeping its handle, name and shape, and re-establish back-edges.
    ///
    /// # Panics
    ///
    /// On a clone contract violation (operand count change, done op over
    /// a non-matching channel op).
    pub fn rewrite_operands(
        &mut self,
        id: InstrId,
        new_operands: &[InstrId],
    ) -> Result<(), BuildError> {
        let (computation, old) = {
            let slot = self.slot(id).ok_or(BuildError::UnknownInstruction(id))?;
            (slot.computation, slot.instr.clone())
        };
        self.check_operands_local(computation, new_operands)?;
        let clone = old.clone_with_new_operands(&*self, old.shape().clone(), new_operands);
        debug!(
            "rewrite {}: operands {:?} -> {:?}",
            id,
            old.operands(),
            new_operands
        );
        self.unlink_users(id, old.operands());
        self.link_users(id, new_operands);
        self.slot_mut(id)?.instr = clone;
        Ok(())
    }

    /// Redirect every use of `old` (operands and computation root) to `new`.
    /// Returns the number of rewritten users.
    pub fn replace_all_uses(&mut self, old: InstrId, new: InstrId) -> Result<usize, BuildError> {
        let computation = self.parent(old).ok_or(BuildError::UnknownInstruction(old))?;
        if self.parent(new) != Some(computation) {
            return Err(BuildError::ForeignOperand {
                operand: new,
                computation,
            });
        }
        let users = self.users(old).to_vec();
        for &user in &users {
            let operands: Vec<InstrId> = self
                .instruction(user)
                .ok_or(BuildError::UnknownInstruction(user))?
                .operands()
                .iter()
                .map(|&o| if o == old { new } else { o })
                .collect();
            self.rewrite_operands(user, &operands)?;
        }
        let comp = self.computation_mut(computation)?;
        if comp.root == Some(old) {
            comp.root = Some(new);
        }
        debug!("replaced {} uses of {} with {}", users.len(), old, new);
        Ok(users.len())
    }

    /// Remove an unused instruction. Its handle is never reused.
    pub fn remove_instruction(&mut self, id: InstrId) -> Result<Instruction, BuildError> {
        let slot = self.slot(id).ok_or(BuildError::UnknownInstruction(id))?;
        if !slot.users.is_empty() {
            return Err(BuildError::StillInUse {
                id,
                users: slot.users.len(),
            });
        }
        let Some(slot) = self.slots[id.index()].take() else {
            return Err(BuildError::UnknownInstruction(id));
        };
        self.unlink_users(id, slot.instr.operands());
        let comp = self.computation_mut(slot.computation)?;
        comp.instructions.retain(|&i| i != id);
        comp.parameters.retain(|_, &mut p| p != id);
        if comp.root == Some(id) {
            comp.root = comp.instructions.last().copied();
        }
        debug!("removed {} ({})", id, slot.name);
        Ok(slot.instr)
    }

    // ── Ordering ────────────────────────────────────────────────────────

    /// Instructions of `computation` with every operand before its users.
    /// Ties follow insertion order.
    pub fn post_order(&self, computation: ComputationId) -> Vec<InstrId> {
        let Some(comp) = self.computation(computation) else {
            return Vec::new();
        };
        let mut visited = vec![false; self.slots.len()];
        let mut order = Vec::with_capacity(comp.instructions.len());
        let mut stack: Vec<(InstrId, bool)> = Vec::new();
        for &start in &comp.instructions {
            stack.push((start, false));
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                if std::mem::replace(&mut visited[id.index()], true) {
                    continue;
                }
                stack.push((id, true));
                if let Some(instr) = self.instruction(id) {
                    for &operand in instr.operands().iter().rev() {
                        if !visited[operand.index()] {
                            stack.push((operand, false));
                        }
                    }
                }
            }
        }
        order
    }

    /// Computations called from `computation`, in first-use order.
    pub fn callees(&self, computation: ComputationId) -> Vec<ComputationId> {
        let mut out = Vec::new();
        for id in self.post_order(computation) {
            if let Some(callee) = self.instruction(id).and_then(|i| i.to_apply()) {
                if !out.contains(&callee) {
                    out.push(callee);
                }
            }
        }
        out
    }

    /// Every computation after the computations it calls; ties follow
    /// creation order. A computation that calls itself is placed when first
    /// reached.
    pub fn computation_post_order(&self) -> Vec<ComputationId> {
        let mut placed = HashSet::new();
        let mut order = Vec::with_capacity(self.computations.len());
        for comp in &self.computations {
            let mut stack = vec![(comp.id, false)];
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                if !placed.insert(id) {
                    continue;
                }
                stack.push((id, true));
                for callee in self.callees(id).into_iter().rev() {
                    if !placed.contains(&callee) {
                        stack.push((callee, false));
                    }
                }
            }
        }
        order
    }

    // ── Channel pairing ─────────────────────────────────────────────────

    /// Check that every send and recv is completed by exactly one matching
    /// done op, that done ops agree with their operand's channel, and that a
    /// channel id is used by at most one send and one recv.
    pub fn check_channel_pairs(&self) -> Result<Vec<ChannelPair>, BuildError> {
        let mut pairs: BTreeMap<i64, ChannelPair> = BTreeMap::new();
        for id in self.instruction_ids() {
            let Some(instr) = self.instruction(id) else {
                continue;
            };
            let Some(channel_id) = instr.channel_id() else {
                continue;
            };
            let pair = pairs.entry(channel_id).or_insert(ChannelPair {
                channel_id,
                send: None,
                recv: None,
            });
            match instr.opcode() {
                Opcode::Send | Opcode::Recv => {
                    let (half, done) = if instr.opcode() == Opcode::Send {
                        (&mut pair.send, Opcode::SendDone)
                    } else {
                        (&mut pair.recv, Opcode::RecvDone)
                    };
                    if let Some(previous) = half.replace(id) {
                        return Err(BuildError::ChannelPairing {
                            channel_id,
                            message: format!(
                                "{} and {} are both {} ops",
                                previous,
                                id,
                                instr.opcode()
                            ),
                        });
                    }
                    let completions = self
                        .users(id)
                        .iter()
                        .filter(|&&u| self.instruction(u).map(|i| i.opcode()) == Some(done))
                        .count();
                    if completions != 1 {
                        return Err(BuildError::ChannelPairing {
                            channel_id,
                            message: format!(
                                "{} {} has {} {} users, expected 1",
                                instr.opcode(),
                                id,
                                completions,
                                done
                            ),
                        });
                    }
                }
                Opcode::SendDone | Opcode::RecvDone => {
                    let operand_channel = self
                        .instruction(instr.operand(0))
                        .and_then(|i| i.channel_id());
                    if operand_channel != Some(channel_id) {
                        return Err(BuildError::ChannelPairing {
                            channel_id,
                            message: format!(
                                "{} {} completes an op on channel {:?}",
                                instr.opcode(),
                                id,
                                operand_channel
                            ),
                        });
                    }
                }
                _ => {}
            }
        }
        Ok(pairs.into_values().collect())
    }

    /// Instruction names of a computation keyed by handle, as printed.
    pub(crate) fn names_of(&self, computation: ComputationId) -> HashMap<InstrId, String> {
        self.computation(computation)
            .map(|c| {
                c.instructions
                    .iter()
                    .filter_map(|&id| Some((id, self.instruction_name(id)?.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl GraphContext for Module {
    fn instruction(&self, id: InstrId) -> Option<&Instruction> {
        Module::instruction(self, id)
    }

    fn computation(&self, id: ComputationId) -> Option<&Computation> {
        Module::computation(self, id)
    }

    fn instruction_name(&self, id: InstrId) -> Option<&str> {
        Module::instruction_name(self, id)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&module_to_string(self, &PrintOptions::default()))
    }
}
