//! Structural validation of a SIR module.
//!
//! Runs before any code generation. These checks are cheap and catch the
//! malformed-input cases a front end can plausibly produce; anything that
//! slips past them and still breaks lowering is an internal error.

use thiserror::Error;

use crate::ir::{
    Block, BlockId, CaseSelector, Function, Inst, Module, Operand, PipelineStage, Terminator,
    TypeId,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("function '{function}': block has instructions but no terminator")]
    MissingTerminator { function: String },

    #[error("function '{function}': switch has no default case")]
    MissingDefaultCase { function: String },

    #[error("function '{function}': switch has {count} default cases")]
    MultipleDefaultCases { function: String, count: usize },

    #[error("function '{function}': {terminator} used outside a loop")]
    MisplacedLoopTerminator {
        function: String,
        terminator: &'static str,
    },

    #[error("function '{function}': {terminator} has no enclosing construct of its kind")]
    MisplacedExit {
        function: String,
        terminator: &'static str,
    },

    #[error(
        "function '{function}': {terminator} carries {got} values but the construct declares {want}"
    )]
    ExitArity {
        function: String,
        terminator: &'static str,
        got: usize,
        want: usize,
    },

    #[error("function '{function}': {terminator} argument {index} has the wrong type")]
    ExitArgType {
        function: String,
        terminator: &'static str,
        index: usize,
    },

    #[error("function '{function}': loop body declares parameters but has no initializer")]
    LoopParamsWithoutInitializer { function: String },

    #[error(
        "function '{function}': {terminator} carries {got} values but the target block declares {want} parameters"
    )]
    BackEdgeArity {
        function: String,
        terminator: &'static str,
        got: usize,
        want: usize,
    },

    #[error("function '{function}': compute stage has a zero workgroup size dimension")]
    ZeroWorkgroupSize { function: String },
}

impl ValidateError {
    fn missing_terminator(function: &str) -> Self {
        Self::MissingTerminator {
            function: function.to_string(),
        }
    }
}

enum FrameKind {
    If,
    Loop {
        body_params: usize,
        continuing_params: usize,
    },
    Switch,
}

struct Frame {
    kind: FrameKind,
    results: Vec<TypeId>,
}

struct Validator<'a> {
    module: &'a Module,
    function: &'a Function,
    frames: Vec<Frame>,
}

/// Validate a module. Returns the first problem found.
pub fn validate(module: &Module) -> Result<(), ValidateError> {
    for function in &module.functions {
        if let Some(PipelineStage::Compute { workgroup_size }) = function.stage {
            if workgroup_size.contains(&0) {
                return Err(ValidateError::ZeroWorkgroupSize {
                    function: function.name.clone(),
                });
            }
        }
        let mut v = Validator {
            module,
            function,
            frames: Vec::new(),
        };
        v.check_block(function.block)?;
    }
    Ok(())
}

impl Validator<'_> {
    fn fname(&self) -> String {
        self.function.name.clone()
    }

    fn check_block(&mut self, id: BlockId) -> Result<(), ValidateError> {
        let block = self.module.block(id);
        if block.terminator.is_none() && !block.insts.is_empty() {
            return Err(ValidateError::missing_terminator(&self.function.name));
        }
        for inst in &block.insts {
            self.check_inst(inst)?;
        }
        if let Some(term) = &block.terminator {
            self.check_terminator(term)?;
        }
        Ok(())
    }

    fn check_inst(&mut self, inst: &Inst) -> Result<(), ValidateError> {
        match inst {
            Inst::If(i) => {
                self.push_frame(FrameKind::If, &i.results);
                self.check_child(i.true_block)?;
                self.check_child(i.false_block)?;
                self.frames.pop();
            }
            Inst::Loop(l) => {
                let body = self.module.block(l.body);
                if !body.params.is_empty() && l.initializer.is_none() {
                    return Err(ValidateError::LoopParamsWithoutInitializer {
                        function: self.fname(),
                    });
                }
                let kind = FrameKind::Loop {
                    body_params: body.params.len(),
                    continuing_params: self.module.block(l.continuing).params.len(),
                };
                self.push_frame(kind, &l.results);
                if let Some(init) = l.initializer {
                    self.check_child(init)?;
                }
                self.check_child(l.body)?;
                self.check_continuing(l.continuing)?;
                self.frames.pop();
            }
            Inst::Switch(s) => {
                let defaults: usize = s
                    .cases
                    .iter()
                    .flat_map(|c| &c.selectors)
                    .filter(|sel| matches!(sel, CaseSelector::Default))
                    .count();
                if defaults == 0 {
                    return Err(ValidateError::MissingDefaultCase {
                        function: self.fname(),
                    });
                }
                if defaults > 1 {
                    return Err(ValidateError::MultipleDefaultCases {
                        function: self.fname(),
                        count: defaults,
                    });
                }
                self.push_frame(FrameKind::Switch, &s.results);
                for case in &s.cases {
                    self.check_child(case.block)?;
                }
                self.frames.pop();
            }
            _ => {}
        }
        Ok(())
    }

    fn check_child(&mut self, id: BlockId) -> Result<(), ValidateError> {
        let block: &Block = self.module.block(id);
        // A completely empty child block is a dead end, not an error.
        if block.is_empty() {
            return Ok(());
        }
        self.check_block(id)
    }

    // The continuing block may omit its terminator; lowering synthesizes the
    // back-edge.
    fn check_continuing(&mut self, id: BlockId) -> Result<(), ValidateError> {
        let block = self.module.block(id);
        for inst in &block.insts {
            self.check_inst(inst)?;
        }
        if let Some(term) = &block.terminator {
            self.check_terminator(term)?;
        }
        Ok(())
    }

    fn push_frame(&mut self, kind: FrameKind, results: &[crate::ir::ValueId]) {
        let results = results
            .iter()
            .map(|&v| self.module.value(v).ty)
            .collect();
        self.frames.push(Frame { kind, results });
    }

    fn check_terminator(&self, term: &Terminator) -> Result<(), ValidateError> {
        match term {
            Terminator::ExitIf { args } => {
                // ExitIf never crosses another construct.
                match self.frames.last() {
                    Some(frame) if matches!(frame.kind, FrameKind::If) => {
                        self.check_exit_args("exit-if", args, frame)
                    }
                    _ => Err(ValidateError::MisplacedExit {
                        function: self.fname(),
                        terminator: "exit-if",
                    }),
                }
            }
            Terminator::ExitSwitch { args } => {
                let frame = self.innermost(|k| matches!(k, FrameKind::Switch), false);
                match frame {
                    Some(frame) => self.check_exit_args("exit-switch", args, frame),
                    None => Err(ValidateError::MisplacedExit {
                        function: self.fname(),
                        terminator: "exit-switch",
                    }),
                }
            }
            Terminator::ExitLoop { args } => {
                let frame = self.innermost(|k| matches!(k, FrameKind::Loop { .. }), false);
                match frame {
                    Some(frame) => self.check_exit_args("exit-loop", args, frame),
                    None => Err(ValidateError::MisplacedExit {
                        function: self.fname(),
                        terminator: "exit-loop",
                    }),
                }
            }
            Terminator::Continue { args } => self.check_back_edge("continue", args, false),
            Terminator::NextIteration { args } => {
                self.check_back_edge("next-iteration", args, true)
            }
            Terminator::BreakIf { args, .. } => self.check_back_edge("break-if", args, true),
            Terminator::Return { .. }
            | Terminator::Unreachable
            | Terminator::TerminateInvocation => Ok(()),
        }
    }

    /// Find the innermost frame of the wanted kind, crossing `If` frames and,
    /// when `cross_switch` holds, `Switch` frames as well.
    fn innermost(&self, want: impl Fn(&FrameKind) -> bool, cross_switch: bool) -> Option<&Frame> {
        for frame in self.frames.iter().rev() {
            if want(&frame.kind) {
                return Some(frame);
            }
            match frame.kind {
                FrameKind::If => continue,
                FrameKind::Switch if cross_switch => continue,
                _ => return None,
            }
        }
        None
    }

    /// A loop back-edge must land inside a loop and carry one value per
    /// parameter of its target block (body for `to_body`, continuing
    /// otherwise).
    fn check_back_edge(
        &self,
        terminator: &'static str,
        args: &[Operand],
        to_body: bool,
    ) -> Result<(), ValidateError> {
        let frame = self.innermost(|k| matches!(k, FrameKind::Loop { .. }), true);
        let Some(frame) = frame else {
            return Err(ValidateError::MisplacedLoopTerminator {
                function: self.fname(),
                terminator,
            });
        };
        let FrameKind::Loop {
            body_params,
            continuing_params,
        } = frame.kind
        else {
            unreachable!()
        };
        let want = if to_body { body_params } else { continuing_params };
        if args.len() != want {
            return Err(ValidateError::BackEdgeArity {
                function: self.fname(),
                terminator,
                got: args.len(),
                want,
            });
        }
        Ok(())
    }

    fn check_exit_args(
        &self,
        terminator: &'static str,
        args: &[Operand],
        frame: &Frame,
    ) -> Result<(), ValidateError> {
        if args.len() != frame.results.len() {
            return Err(ValidateError::ExitArity {
                function: self.fname(),
                terminator,
                got: args.len(),
                want: frame.results.len(),
            });
        }
        for (index, (&arg, &want)) in args.iter().zip(&frame.results).enumerate() {
            if self.module.operand_type(arg) != want {
                return Err(ValidateError::ExitArgType {
                    function: self.fname(),
                    terminator,
                    index,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Terminator};

    fn empty_module() -> Module {
        Module::new()
    }

    #[test]
    fn trivial_function_passes() {
        let mut m = empty_module();
        let void = m.types.void();
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        b.ret();
        assert_eq!(validate(&m), Ok(()));
    }

    #[test]
    fn instructions_without_terminator_fail() {
        let mut m = empty_module();
        let void = m.types.void();
        let f32 = m.types.f32();
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        b.var("x", f32, None);
        // No terminator set.
        assert!(matches!(
            validate(&m),
            Err(ValidateError::MissingTerminator { .. })
        ));
    }

    #[test]
    fn switch_needs_exactly_one_default() {
        use crate::ir::{Case, CaseSelector};
        let mut m = empty_module();
        let void = m.types.void();
        let zero = m.const_i32(0);
        let sel = match m.const_i32(1) {
            Operand::Const(c) => c,
            _ => unreachable!(),
        };
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        let case_block = b.create_block();
        b.switch_(
            zero,
            vec![Case {
                selectors: vec![CaseSelector::Value(sel)],
                block: case_block,
            }],
            &[],
        );
        b.switch_to(case_block);
        b.terminate(Terminator::ExitSwitch { args: vec![] });
        let entry = m.function(crate::ir::FuncId(0)).block;
        m.block_mut(entry).terminator = Some(Terminator::Return { value: None });
        assert!(matches!(
            validate(&m),
            Err(ValidateError::MissingDefaultCase { .. })
        ));
    }

    #[test]
    fn continue_outside_loop_fails() {
        let mut m = empty_module();
        let void = m.types.void();
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        b.terminate(Terminator::Continue { args: vec![] });
        assert!(matches!(
            validate(&m),
            Err(ValidateError::MisplacedLoopTerminator { .. })
        ));
    }

    #[test]
    fn exit_if_arity_checked() {
        let mut m = empty_module();
        let void = m.types.void();
        let f32 = m.types.f32();
        let cond = m.const_bool(true);
        let one = m.const_f32(1.0);
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        let t = b.create_block();
        let f = b.create_block();
        b.if_(cond, t, f, &[f32]);
        b.ret();
        b.switch_to(t);
        b.terminate(Terminator::ExitIf { args: vec![] }); // missing the arg
        b.switch_to(f);
        b.terminate(Terminator::ExitIf { args: vec![one] });
        assert!(matches!(
            validate(&m),
            Err(ValidateError::ExitArity { got: 0, want: 1, .. })
        ));
    }

    #[test]
    fn exit_if_type_checked() {
        let mut m = empty_module();
        let void = m.types.void();
        let f32 = m.types.f32();
        let cond = m.const_bool(true);
        let one_f = m.const_f32(1.0);
        let one_i = m.const_i32(1);
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        let t = b.create_block();
        let f = b.create_block();
        b.if_(cond, t, f, &[f32]);
        b.ret();
        b.switch_to(t);
        b.terminate(Terminator::ExitIf { args: vec![one_i] });
        b.switch_to(f);
        b.terminate(Terminator::ExitIf { args: vec![one_f] });
        assert!(matches!(
            validate(&m),
            Err(ValidateError::ExitArgType { index: 0, .. })
        ));
    }

    #[test]
    fn loop_params_need_initializer() {
        use crate::ir::{Inst, Loop};
        let mut m = empty_module();
        let void = m.types.void();
        let f32 = m.types.f32();
        let body = m.new_block();
        let continuing = m.new_block();
        let p = m.new_value(f32);
        m.block_mut(body).params.push(p);
        m.block_mut(body).terminator = Some(Terminator::ExitLoop { args: vec![] });
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        b.push(Inst::Loop(Loop {
            initializer: None,
            body,
            continuing,
            results: vec![],
        }));
        b.ret();
        assert!(matches!(
            validate(&m),
            Err(ValidateError::LoopParamsWithoutInitializer { .. })
        ));
    }

    #[test]
    fn break_if_crosses_switch_frames() {
        use crate::ir::{Case, CaseSelector};
        let mut m = empty_module();
        let void = m.types.void();
        let zero = m.const_i32(0);
        let mut b = FunctionBuilder::new(&mut m, "main", void, None);
        let body = b.create_block();
        let continuing = b.create_block();
        let case_block = b.create_block();
        b.loop_(None, body, continuing, &[]);
        b.ret();
        b.switch_to(body);
        b.switch_(
            zero,
            vec![Case {
                selectors: vec![CaseSelector::Default],
                block: case_block,
            }],
            &[],
        );
        b.terminate(Terminator::ExitLoop { args: vec![] });
        b.switch_to(case_block);
        // Loop terminator inside a switch inside the loop body: allowed.
        b.terminate(Terminator::Continue { args: vec![] });
        b.switch_to(continuing);
        b.terminate(Terminator::NextIteration { args: vec![] });
        assert_eq!(validate(&m), Ok(()));
    }
}
