//! Producer-side builder for [`FunctionUnit`]
//!
//! Wires SSA definition links, successor/predecessor edges and block
//! membership so that producers (and tests) cannot construct an arena with
//! dangling ids.

use crate::ctype::CType;
use crate::unit::{
    BlockData, BlockId, CmpKind, FunctionUnit, InstrData, InstrId, InstrKind, OperandData,
    OperandId, OperandKind, ValueOp,
};

#[derive(Debug)]
pub struct FunctionUnitBuilder {
    unit: FunctionUnit,
}

impl FunctionUnitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            unit: FunctionUnit {
                name: name.into(),
                blocks: Vec::new(),
                instrs: Vec::new(),
                operands: Vec::new(),
            },
        }
    }

    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId(self.unit.blocks.len() as u32);
        self.unit.blocks.push(BlockData::default());
        id
    }

    fn add_operand(&mut self, data: OperandData) -> OperandId {
        let id = OperandId(self.unit.operands.len() as u32);
        self.unit.operands.push(data);
        id
    }

    /// A source-level variable.
    pub fn var(&mut self, name: impl Into<String>, ty: CType) -> OperandId {
        self.add_operand(OperandData {
            kind: OperandKind::Variable { name: name.into() },
            ty,
            is_temporary: false,
            is_address_of: false,
            def: None,
        })
    }

    /// A compiler temporary.
    pub fn temp(&mut self, name: impl Into<String>, ty: CType) -> OperandId {
        self.add_operand(OperandData {
            kind: OperandKind::Variable { name: name.into() },
            ty,
            is_temporary: true,
            is_address_of: false,
            def: None,
        })
    }

    pub fn int_imm(&mut self, value: i128, ty: CType) -> OperandId {
        self.add_operand(OperandData {
            kind: OperandKind::IntImmediate(value),
            ty,
            is_temporary: true,
            is_address_of: false,
            def: None,
        })
    }

    pub fn float_imm(&mut self, value: f64, ty: CType) -> OperandId {
        self.add_operand(OperandData {
            kind: OperandKind::FloatImmediate(value),
            ty,
            is_temporary: true,
            is_address_of: false,
            def: None,
        })
    }

    /// An `&x` operand. `of` must be a variable operand; the result has
    /// pointer-to-its-type.
    pub fn addr_of(&mut self, of: OperandId, pointer_bits: u32) -> OperandId {
        let base = self.unit.operand(of).clone();
        let name = base
            .name()
            .expect("addr_of requires a variable operand")
            .to_string();
        self.add_operand(OperandData {
            kind: OperandKind::Variable { name },
            ty: CType::pointer(base.ty, pointer_bits),
            is_temporary: base.is_temporary,
            is_address_of: true,
            def: None,
        })
    }

    /// A memory access through `base` at a bit displacement, reading or
    /// writing a value of type `ty`.
    pub fn memory(&mut self, base: OperandId, bit_offset: u64, ty: CType) -> OperandId {
        self.add_operand(OperandData {
            kind: OperandKind::Memory { base, bit_offset },
            ty,
            is_temporary: false,
            is_address_of: false,
            def: None,
        })
    }

    fn add_instr(&mut self, data: InstrData) -> InstrId {
        let id = InstrId(self.unit.instrs.len() as u32);
        let block = data.block;
        for &d in &data.dsts {
            self.unit.operands[d.0 as usize].def = Some(id);
        }
        self.unit.instrs.push(data);
        self.unit.blocks[block.0 as usize].instrs.push(id);
        id
    }

    pub fn value_instr(
        &mut self,
        block: BlockId,
        op: ValueOp,
        dst: OperandId,
        srcs: Vec<OperandId>,
        line: u32,
    ) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Value(op),
            block,
            line,
            dsts: vec![dst],
            srcs,
            phi_sources: Vec::new(),
        })
    }

    pub fn compare_instr(
        &mut self,
        block: BlockId,
        kind: CmpKind,
        dst: OperandId,
        lhs: OperandId,
        rhs: OperandId,
        line: u32,
    ) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Compare(kind),
            block,
            line,
            dsts: vec![dst],
            srcs: vec![lhs, rhs],
            phi_sources: Vec::new(),
        })
    }

    pub fn call_instr(
        &mut self,
        block: BlockId,
        callee: impl Into<String>,
        dst: Option<OperandId>,
        args: Vec<OperandId>,
        line: u32,
    ) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Call {
                callee: callee.into(),
            },
            block,
            line,
            dsts: dst.into_iter().collect(),
            srcs: args,
            phi_sources: Vec::new(),
        })
    }

    pub fn phi_instr(
        &mut self,
        block: BlockId,
        dst: OperandId,
        sources: Vec<(OperandId, BlockId)>,
        line: u32,
    ) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Phi,
            block,
            line,
            dsts: vec![dst],
            srcs: sources.iter().map(|&(op, _)| op).collect(),
            phi_sources: sources,
        })
    }

    /// Unconditional jump.
    pub fn goto_instr(&mut self, block: BlockId, target: BlockId, line: u32) -> InstrId {
        self.link(block, target);
        self.add_instr(InstrData {
            kind: InstrKind::Branch,
            block,
            line,
            dsts: Vec::new(),
            srcs: Vec::new(),
            phi_sources: Vec::new(),
        })
    }

    /// Conditional branch on `cond`; falls to `if_false` when the condition
    /// is zero.
    pub fn branch_instr(
        &mut self,
        block: BlockId,
        cond: OperandId,
        if_true: BlockId,
        if_false: BlockId,
        line: u32,
    ) -> InstrId {
        self.link(block, if_true);
        self.link(block, if_false);
        self.add_instr(InstrData {
            kind: InstrKind::Branch,
            block,
            line,
            dsts: Vec::new(),
            srcs: vec![cond],
            phi_sources: Vec::new(),
        })
    }

    pub fn switch_instr(&mut self, block: BlockId, cond: OperandId, line: u32) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Switch,
            block,
            line,
            dsts: Vec::new(),
            srcs: vec![cond],
            phi_sources: Vec::new(),
        })
    }

    pub fn start_instr(&mut self, block: BlockId, dsts: Vec<OperandId>, line: u32) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Start,
            block,
            line,
            dsts,
            srcs: Vec::new(),
            phi_sources: Vec::new(),
        })
    }

    pub fn return_instr(&mut self, block: BlockId, value: Option<OperandId>, line: u32) -> InstrId {
        self.add_instr(InstrData {
            kind: InstrKind::Return,
            block,
            line,
            dsts: Vec::new(),
            srcs: value.into_iter().collect(),
            phi_sources: Vec::new(),
        })
    }

    fn link(&mut self, from: BlockId, to: BlockId) {
        self.unit.blocks[from.0 as usize].succs.push(to);
        self.unit.blocks[to.0 as usize].preds.push(from);
    }

    pub fn finish(self) -> FunctionUnit {
        self.unit
    }
}
