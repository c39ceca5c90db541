//! Structured control-flow emission.
//!
//! Each construct flattens to the standard SPIR-V shape: an `If` becomes a
//! selection merge with a conditional branch, a `Loop` becomes the
//! header/body/continuing/merge diamond, a `Switch` becomes a flat selector
//! table. Values leaving a construct are reconstructed as `OpPhi` at the
//! merge block from the exit edges, sorted by source label so emission order
//! never changes the output.
//!
//! Branch targets for `Exit*` and the loop back-edges are resolved against an
//! explicit stack of [`ControlFrame`]s.

use crate::ice;
use crate::ir::{BlockId, ConstData, If, Inst, Loop, Operand, Switch, Terminator, ValueId};
use crate::spirv::opcodes::{Op, CONTROL_NONE};
use crate::spirv::Operand as SpvOperand;

use super::Generator;

/// An enclosing construct during body emission.
pub(crate) enum ControlFrame {
    If { merge: u32 },
    Loop { header: u32, continuing: u32, merge: u32 },
    Switch { merge: u32 },
}

/// An edge into a merge block: source label plus the carried values, `None`
/// when the edge carries nothing (a `BreakIf` exit).
type ExitEdge = (u32, Option<Vec<Operand>>);

/// A back-edge or continue edge: source label plus its argument values.
type IncomingEdge = (u32, Vec<Operand>);

impl<'a> Generator<'a> {
    /// Emit a block's instructions and terminator into the current function.
    /// The caller has already emitted the label.
    pub(crate) fn emit_block_contents(&mut self, id: BlockId) {
        let ir = self.ir;
        let block = ir.block(id);
        if block.is_empty() {
            self.current.push_inst(Op::Unreachable, vec![]);
            return;
        }
        self.emit_insts(id);
        match &block.terminator {
            Some(term) => self.emit_terminator(term),
            None => ice!("unterminated block survived validation"),
        }
    }

    fn emit_insts(&mut self, id: BlockId) {
        let ir = self.ir;
        for (index, inst) in ir.block(id).insts.iter().enumerate() {
            match inst {
                Inst::If(i) => self.emit_if(i, (id, index)),
                Inst::Loop(l) => self.emit_loop(l, (id, index)),
                Inst::Switch(s) => self.emit_switch(s, (id, index)),
                _ => self.emit_inst(inst),
            }
        }
    }

    fn emit_if(&mut self, i: &'a If, key: (BlockId, usize)) {
        let merge = self.merge_label(key);
        let cond = self.op_id(i.condition);
        let has_results = !i.results.is_empty();

        // A branch that holds nothing but its exit collapses onto the merge
        // block. Constructs with results keep both labels so the merge phis
        // have real incoming edges.
        let true_needs = self.branch_needs_label(i.true_block, has_results);
        let false_needs = self.branch_needs_label(i.false_block, has_results);
        let true_label = if true_needs { self.label(i.true_block) } else { merge };
        let false_label = if false_needs { self.label(i.false_block) } else { merge };

        self.current.push_inst(
            Op::SelectionMerge,
            vec![SpvOperand::Id(merge), SpvOperand::Literal(CONTROL_NONE)],
        );
        self.current.push_inst(
            Op::BranchConditional,
            vec![
                SpvOperand::Id(cond),
                SpvOperand::Id(true_label),
                SpvOperand::Id(false_label),
            ],
        );

        self.frames.push(ControlFrame::If { merge });
        if true_needs {
            self.current
                .push_inst(Op::Label, vec![SpvOperand::Id(true_label)]);
            self.emit_block_contents(i.true_block);
        }
        if false_needs {
            self.current
                .push_inst(Op::Label, vec![SpvOperand::Id(false_label)]);
            self.emit_block_contents(i.false_block);
        }
        self.frames.pop();

        self.current.push_inst(Op::Label, vec![SpvOperand::Id(merge)]);
        let edges = self.if_exit_edges(i);
        self.emit_exit_phis(&i.results, edges);
    }

    fn branch_needs_label(&self, block: BlockId, has_results: bool) -> bool {
        if has_results {
            return true;
        }
        let b = self.ir.block(block);
        if !b.insts.is_empty() {
            return true;
        }
        !matches!(b.terminator, Some(Terminator::ExitIf { .. }) | None)
    }

    fn emit_loop(&mut self, l: &'a Loop, key: (BlockId, usize)) {
        let ir = self.ir;
        let body_label = self.label(l.body);
        let continuing_label = self.label(l.continuing);
        let header = self.module.next_id();
        let merge = self.merge_label(key);

        self.frames.push(ControlFrame::Loop {
            header,
            continuing: continuing_label,
            merge,
        });

        match l.initializer {
            Some(init) => {
                let init_label = self.label(init);
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(init_label)]);
                self.current
                    .push_inst(Op::Label, vec![SpvOperand::Id(init_label)]);
                self.emit_block_contents(init);
            }
            None => {
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(header)]);
            }
        }

        // Header: body parameter phis, then the loop merge declaration.
        self.current.push_inst(Op::Label, vec![SpvOperand::Id(header)]);
        let back_edges = self.back_edges(l);
        self.emit_incoming_phis(&ir.block(l.body).params, &back_edges);
        self.current.push_inst(
            Op::LoopMerge,
            vec![
                SpvOperand::Id(merge),
                SpvOperand::Id(continuing_label),
                SpvOperand::Literal(CONTROL_NONE),
            ],
        );
        self.current
            .push_inst(Op::Branch, vec![SpvOperand::Id(body_label)]);

        self.current
            .push_inst(Op::Label, vec![SpvOperand::Id(body_label)]);
        self.emit_block_contents(l.body);

        // Continuing: always emitted. A missing terminator gets the
        // synthetic back-edge.
        self.current
            .push_inst(Op::Label, vec![SpvOperand::Id(continuing_label)]);
        let continue_edges = self.continue_edges(l);
        self.emit_incoming_phis(&ir.block(l.continuing).params, &continue_edges);
        self.emit_insts(l.continuing);
        match &ir.block(l.continuing).terminator {
            Some(term) => self.emit_terminator(term),
            None => {
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(header)]);
            }
        }

        self.frames.pop();

        self.current.push_inst(Op::Label, vec![SpvOperand::Id(merge)]);
        let edges = self.loop_exit_edges(l);
        self.emit_exit_phis(&l.results, edges);
    }

    fn emit_switch(&mut self, s: &'a Switch, key: (BlockId, usize)) {
        let merge = self.merge_label(key);
        let cond = self.op_id(s.condition);

        let mut default_label = None;
        for case in &s.cases {
            if case
                .selectors
                .iter()
                .any(|sel| matches!(sel, crate::ir::CaseSelector::Default))
            {
                default_label = Some(self.label(case.block));
            }
        }
        let Some(default_label) = default_label else {
            ice!("switch without a default case survived validation");
        };

        self.current.push_inst(
            Op::SelectionMerge,
            vec![SpvOperand::Id(merge), SpvOperand::Literal(CONTROL_NONE)],
        );
        let mut operands = vec![SpvOperand::Id(cond), SpvOperand::Id(default_label)];
        for case in &s.cases {
            let label = self.label(case.block);
            for selector in &case.selectors {
                if let crate::ir::CaseSelector::Value(c) = selector {
                    operands.push(SpvOperand::Literal(self.selector_bits(*c)));
                    operands.push(SpvOperand::Id(label));
                }
            }
        }
        self.current.push_inst(Op::Switch, operands);

        self.frames.push(ControlFrame::Switch { merge });
        for case in &s.cases {
            let label = self.label(case.block);
            self.current.push_inst(Op::Label, vec![SpvOperand::Id(label)]);
            self.emit_block_contents(case.block);
        }
        self.frames.pop();

        self.current.push_inst(Op::Label, vec![SpvOperand::Id(merge)]);
        let edges = self.switch_exit_edges(s);
        self.emit_exit_phis(&s.results, edges);
    }

    fn selector_bits(&self, c: crate::ir::ConstId) -> u32 {
        match self.consts.get(c).data {
            ConstData::I32(v) => v as u32,
            ConstData::U32(v) => v,
            _ => ice!("non-integer switch selector"),
        }
    }

    pub(crate) fn emit_terminator(&mut self, term: &Terminator) {
        match term {
            Terminator::Return { value: None } => {
                self.current.push_inst(Op::Return, vec![]);
            }
            Terminator::Return { value: Some(v) } => {
                let id = self.op_id(*v);
                self.current
                    .push_inst(Op::ReturnValue, vec![SpvOperand::Id(id)]);
            }
            Terminator::Unreachable => {
                self.current.push_inst(Op::Unreachable, vec![]);
            }
            Terminator::TerminateInvocation => {
                self.current.push_inst(Op::Kill, vec![]);
            }
            Terminator::ExitIf { .. } => {
                let merge = self.if_merge();
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(merge)]);
            }
            Terminator::ExitSwitch { .. } => {
                let merge = self.switch_merge();
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(merge)]);
            }
            Terminator::ExitLoop { .. } => {
                let (_, _, merge) = self.loop_frame(false);
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(merge)]);
            }
            Terminator::Continue { .. } => {
                let (_, continuing, _) = self.loop_frame(true);
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(continuing)]);
            }
            Terminator::NextIteration { .. } => {
                let (header, _, _) = self.loop_frame(true);
                self.current
                    .push_inst(Op::Branch, vec![SpvOperand::Id(header)]);
            }
            Terminator::BreakIf { condition, .. } => {
                let cond = self.op_id(*condition);
                let (header, _, merge) = self.loop_frame(true);
                self.current.push_inst(
                    Op::BranchConditional,
                    vec![
                        SpvOperand::Id(cond),
                        SpvOperand::Id(merge),
                        SpvOperand::Id(header),
                    ],
                );
            }
        }
    }

    fn if_merge(&self) -> u32 {
        match self.frames.last() {
            Some(ControlFrame::If { merge }) => *merge,
            _ => ice!("exit-if outside an if construct"),
        }
    }

    fn switch_merge(&self) -> u32 {
        for frame in self.frames.iter().rev() {
            match frame {
                ControlFrame::If { .. } => continue,
                ControlFrame::Switch { merge } => return *merge,
                ControlFrame::Loop { .. } => break,
            }
        }
        ice!("exit-switch outside a switch construct")
    }

    fn loop_frame(&self, cross_switch: bool) -> (u32, u32, u32) {
        for frame in self.frames.iter().rev() {
            match frame {
                ControlFrame::If { .. } => continue,
                ControlFrame::Switch { .. } if cross_switch => continue,
                ControlFrame::Loop {
                    header,
                    continuing,
                    merge,
                } => return (*header, *continuing, *merge),
                _ => break,
            }
        }
        ice!("loop terminator outside a loop construct")
    }

    /// Label of the basic block that actually holds a block's terminator.
    /// When the block ends with a nested construct, emission resumes in that
    /// construct's merge block, so the terminator branches from there.
    fn terminator_label(&mut self, block: BlockId) -> u32 {
        let b = self.ir.block(block);
        if let Some(index) = b.insts.len().checked_sub(1) {
            if matches!(
                b.insts[index],
                Inst::If(_) | Inst::Loop(_) | Inst::Switch(_)
            ) {
                return self.merge_label((block, index));
            }
        }
        self.label(block)
    }

    /// Blocks of a construct subtree that can branch directly to one of this
    /// construct's labels. Descends into nested `If`s (and `Switch`es when
    /// `into_switch`), never into nested loops, which capture their own
    /// edges.
    fn subtree_blocks(&self, root: BlockId, into_switch: bool, out: &mut Vec<BlockId>) {
        out.push(root);
        for inst in &self.ir.block(root).insts {
            match inst {
                Inst::If(i) => {
                    self.subtree_blocks(i.true_block, into_switch, out);
                    self.subtree_blocks(i.false_block, into_switch, out);
                }
                Inst::Switch(s) if into_switch => {
                    for case in &s.cases {
                        self.subtree_blocks(case.block, into_switch, out);
                    }
                }
                _ => {}
            }
        }
    }

    fn if_exit_edges(&mut self, i: &If) -> Vec<ExitEdge> {
        let ir = self.ir;
        let mut edges = Vec::new();
        for block in [i.true_block, i.false_block] {
            if let Some(Terminator::ExitIf { args }) = &ir.block(block).terminator {
                let label = self.terminator_label(block);
                edges.push((label, Some(args.clone())));
            }
        }
        edges
    }

    fn switch_exit_edges(&mut self, s: &Switch) -> Vec<ExitEdge> {
        let ir = self.ir;
        let mut blocks = Vec::new();
        for case in &s.cases {
            self.subtree_blocks(case.block, false, &mut blocks);
        }
        let mut edges = Vec::new();
        for block in blocks {
            if let Some(Terminator::ExitSwitch { args }) = &ir.block(block).terminator {
                let label = self.terminator_label(block);
                edges.push((label, Some(args.clone())));
            }
        }
        edges
    }

    fn loop_exit_edges(&mut self, l: &Loop) -> Vec<ExitEdge> {
        let ir = self.ir;
        let mut blocks = Vec::new();
        if let Some(init) = l.initializer {
            self.subtree_blocks(init, false, &mut blocks);
        }
        self.subtree_blocks(l.body, false, &mut blocks);
        self.subtree_blocks(l.continuing, false, &mut blocks);
        let mut edges = Vec::new();
        for block in blocks {
            match &ir.block(block).terminator {
                Some(Terminator::ExitLoop { args }) => {
                    let label = self.terminator_label(block);
                    edges.push((label, Some(args.clone())));
                }
                // A conditional exit carries no values; the merge phis read
                // undef along this edge.
                Some(Terminator::BreakIf { .. }) => {
                    let label = self.terminator_label(block);
                    edges.push((label, None));
                }
                _ => {}
            }
        }
        edges
    }

    /// Back-edges into the loop header: the initializer entry plus every
    /// `NextIteration`/`BreakIf` in the initializer and continuing subtrees.
    fn back_edges(&mut self, l: &Loop) -> Vec<IncomingEdge> {
        let ir = self.ir;
        let mut blocks = Vec::new();
        if let Some(init) = l.initializer {
            self.subtree_blocks(init, true, &mut blocks);
        }
        self.subtree_blocks(l.continuing, true, &mut blocks);
        let mut edges = Vec::new();
        for block in blocks {
            match &ir.block(block).terminator {
                Some(Terminator::NextIteration { args })
                | Some(Terminator::BreakIf { args, .. }) => {
                    let label = self.terminator_label(block);
                    edges.push((label, args.clone()));
                }
                _ => {}
            }
        }
        edges
    }

    /// Edges into the continuing block from `Continue` terminators in the
    /// body subtree.
    fn continue_edges(&mut self, l: &Loop) -> Vec<IncomingEdge> {
        let ir = self.ir;
        let mut blocks = Vec::new();
        self.subtree_blocks(l.body, true, &mut blocks);
        let mut edges = Vec::new();
        for block in blocks {
            if let Some(Terminator::Continue { args }) = &ir.block(block).terminator {
                let label = self.terminator_label(block);
                edges.push((label, args.clone()));
            }
        }
        edges
    }

    /// Phi nodes for block parameters from their incoming edges.
    fn emit_incoming_phis(&mut self, params: &[ValueId], edges: &[IncomingEdge]) {
        let ir = self.ir;
        for (index, &param) in params.iter().enumerate() {
            let ty = ir.value(param).ty;
            let ty_id = self.type_id(ty);
            let result = self.value_id(param);
            let mut operands = vec![SpvOperand::Id(ty_id), SpvOperand::Id(result)];
            for (label, args) in edges {
                let value = self.op_id(args[index]);
                operands.push(SpvOperand::Id(value));
                operands.push(SpvOperand::Id(*label));
            }
            self.current.push_inst(Op::Phi, operands);
        }
    }

    /// Phi nodes for a construct's declared results at its merge block.
    fn emit_exit_phis(&mut self, results: &[ValueId], mut edges: Vec<ExitEdge>) {
        if results.is_empty() {
            return;
        }
        let ir = self.ir;
        edges.sort_by_key(|&(label, _)| label);
        if edges.is_empty() {
            // No exit reaches the merge block; the results are unreachable
            // and degrade to undef.
            for &result in results {
                let ty = ir.value(result).ty;
                let id = self.undef(ty);
                self.value_ids.insert(result, id);
            }
            return;
        }
        for (index, &result) in results.iter().enumerate() {
            let ty = ir.value(result).ty;
            let ty_id = self.type_id(ty);
            let id = self.value_id(result);
            let mut operands = vec![SpvOperand::Id(ty_id), SpvOperand::Id(id)];
            for (label, args) in &edges {
                let value = match args {
                    Some(args) => self.op_id(args[index]),
                    None => self.undef(ty),
                };
                operands.push(SpvOperand::Id(value));
                operands.push(SpvOperand::Id(*label));
            }
            self.current.push_inst(Op::Phi, operands);
        }
    }
}
