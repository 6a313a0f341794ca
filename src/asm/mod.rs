//! Textual x86-64 assembly in GNU assembler (AT&T) syntax.
//!
//! The code generator builds a flat list of [`Instruction`]s; rendering one
//! instruction per line via [`Display`] yields the final `.s` file.
mod reg;

use std::fmt::Display;

pub use self::reg::*;

/// Operand size in bytes, rendered as the AT&T mnemonic suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionSize {
    Byte,
    Long,
    Quad,
}

impl InstructionSize {
    pub fn suffix(self) -> char {
        match self {
            InstructionSize::Byte => 'b',
            InstructionSize::Long => 'l',
            InstructionSize::Quad => 'q',
        }
    }
}

impl From<usize> for InstructionSize {
    fn from(size: usize) -> Self {
        match size {
            1 => InstructionSize::Byte,
            4 => InstructionSize::Long,
            8 => InstructionSize::Quad,
            _ => unreachable!("no instruction suffix for operand size {size}"),
        }
    }
}

/// Scalar SSE precision, rendered as the trailing `s`/`d` of `movss`/`movsd` etc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Single,
    Double,
}

impl Precision {
    pub fn suffix(self) -> char {
        match self {
            Precision::Single => 's',
            Precision::Double => 'd',
        }
    }
}

/// Condition codes used by `set<cc>` and `j<cc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    E,
    Ne,
    L,
    Le,
    G,
    Ge,
    A,
    Na,
    Ae,
    Nae,
    P,
    Np,
}

impl Display for Cond {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Cond::E => "e",
            Cond::Ne => "ne",
            Cond::L => "l",
            Cond::Le => "le",
            Cond::G => "g",
            Cond::Ge => "ge",
            Cond::A => "a",
            Cond::Na => "na",
            Cond::Ae => "ae",
            Cond::Nae => "nae",
            Cond::P => "p",
            Cond::Np => "np",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    /// `$42`
    Imm(i64),
    /// `disp(%reg)`
    Mem(i64, Reg),
    /// `$label` (absolute address of a symbol)
    Sym(String),
    /// `label(%rip)`
    Rip(String),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "{reg}"),
            Operand::Imm(value) => write!(f, "${value}"),
            Operand::Mem(0, reg) => write!(f, "({reg})"),
            Operand::Mem(disp, reg) => write!(f, "{disp}({reg})"),
            Operand::Sym(label) => write!(f, "${label}"),
            Operand::Rip(label) => write!(f, "{label}(%rip)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    Label(String),
    /// An assembler directive such as `.text` or `.globl main`.
    Directive(String),
    Comment(String),

    Mov(InstructionSize, Operand, Operand),
    Movs(Precision, Operand, Operand),
    Movzbl(Operand, Operand),
    Lea(InstructionSize, Operand, Operand),

    Add(InstructionSize, Operand, Operand),
    Sub(InstructionSize, Operand, Operand),
    Imul(InstructionSize, Operand, Operand),
    Idiv(InstructionSize, Operand),
    And(InstructionSize, Operand, Operand),
    Or(InstructionSize, Operand, Operand),
    Xor(InstructionSize, Operand, Operand),
    Neg(InstructionSize, Operand),
    Not(InstructionSize, Operand),
    Sal(InstructionSize, Operand, Operand),
    Sar(InstructionSize, Operand, Operand),
    Cltd,
    Cltq,
    Cqto,

    Test(InstructionSize, Operand, Operand),
    Cmp(InstructionSize, Operand, Operand),
    Set(Cond, Operand),
    Jmp(String),
    J(Cond, String),

    Push(Operand),
    Pop(Operand),
    Call(String),
    Leave,
    Ret,

    Adds(Precision, Operand, Operand),
    Subs(Precision, Operand, Operand),
    Muls(Precision, Operand, Operand),
    Divs(Precision, Operand, Operand),
    Ucomis(Precision, Operand, Operand),
    Xorp(Precision, Operand, Operand),
    Cvtsi2s(Precision, Operand, Operand),
    Cvtts2si(Precision, Operand, Operand),
    Cvtss2sd(Operand, Operand),
    Cvtsd2ss(Operand, Operand),
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Instruction::*;

        match self {
            Label(label) => write!(f, "{label}:"),
            Directive(directive) => write!(f, "\t{directive}"),
            Comment(comment) => write!(f, "\t# {comment}"),

            Mov(size, src, dst) => write!(f, "\tmov{}\t{src}, {dst}", size.suffix()),
            Movs(p, src, dst) => write!(f, "\tmovs{}\t{src}, {dst}", p.suffix()),
            Movzbl(src, dst) => write!(f, "\tmovzbl\t{src}, {dst}"),
            Lea(size, src, dst) => write!(f, "\tlea{}\t{src}, {dst}", size.suffix()),

            Add(size, src, dst) => write!(f, "\tadd{}\t{src}, {dst}", size.suffix()),
            Sub(size, src, dst) => write!(f, "\tsub{}\t{src}, {dst}", size.suffix()),
            Imul(size, src, dst) => write!(f, "\timul{}\t{src}, {dst}", size.suffix()),
            Idiv(size, src) => write!(f, "\tidiv{}\t{src}", size.suffix()),
            And(size, src, dst) => write!(f, "\tand{}\t{src}, {dst}", size.suffix()),
            Or(size, src, dst) => write!(f, "\tor{}\t{src}, {dst}", size.suffix()),
            Xor(size, src, dst) => write!(f, "\txor{}\t{src}, {dst}", size.suffix()),
            Neg(size, dst) => write!(f, "\tneg{}\t{dst}", size.suffix()),
            Not(size, dst) => write!(f, "\tnot{}\t{dst}", size.suffix()),
            Sal(size, src, dst) => write!(f, "\tsal{}\t{src}, {dst}", size.suffix()),
            Sar(size, src, dst) => write!(f, "\tsar{}\t{src}, {dst}", size.suffix()),
            Cltd => f.write_str("\tcltd"),
            Cltq => f.write_str("\tcltq"),
            Cqto => f.write_str("\tcqto"),

            Test(size, a, b) => write!(f, "\ttest{}\t{a}, {b}", size.suffix()),
            Cmp(size, a, b) => write!(f, "\tcmp{}\t{a}, {b}", size.suffix()),
            Set(cc, dst) => write!(f, "\tset{cc}\t{dst}"),
            Jmp(label) => write!(f, "\tjmp\t{label}"),
            J(cc, label) => write!(f, "\tj{cc}\t{label}"),

            Push(src) => write!(f, "\tpushq\t{src}"),
            Pop(dst) => write!(f, "\tpopq\t{dst}"),
            Call(name) => write!(f, "\tcall\t{name}"),
            Leave => f.write_str("\tleave"),
            Ret => f.write_str("\tret"),

            Adds(p, src, dst) => write!(f, "\tadds{}\t{src}, {dst}", p.suffix()),
            Subs(p, src, dst) => write!(f, "\tsubs{}\t{src}, {dst}", p.suffix()),
            Muls(p, src, dst) => write!(f, "\tmuls{}\t{src}, {dst}", p.suffix()),
            Divs(p, src, dst) => write!(f, "\tdivs{}\t{src}, {dst}", p.suffix()),
            Ucomis(p, a, b) => write!(f, "\tucomis{}\t{a}, {b}", p.suffix()),
            Xorp(p, src, dst) => write!(f, "\txorp{}\t{src}, {dst}", p.suffix()),
            Cvtsi2s(p, src, dst) => write!(f, "\tcvtsi2s{}l\t{src}, {dst}", p.suffix()),
            Cvtts2si(p, src, dst) => write!(f, "\tcvtts{}2si\t{src}, {dst}", p.suffix()),
            Cvtss2sd(src, dst) => write!(f, "\tcvtss2sd\t{src}, {dst}"),
            Cvtsd2ss(src, dst) => write!(f, "\tcvtsd2ss\t{src}, {dst}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mov_rendering() {
        let inst = Instruction::Mov(
            InstructionSize::Long,
            Operand::Imm(7),
            Operand::Reg(Reg::Eax),
        );
        assert_eq!(inst.to_string(), "\tmovl\t$7, %eax");
    }

    #[test]
    fn test_memory_operands() {
        assert_eq!(Operand::Mem(-8, Reg::Rbp).to_string(), "-8(%rbp)");
        assert_eq!(Operand::Mem(0, Reg::Rsp).to_string(), "(%rsp)");
        assert_eq!(Operand::Rip(".LC0".into()).to_string(), ".LC0(%rip)");
        assert_eq!(Operand::Sym(".LC1".into()).to_string(), "$.LC1");
    }

    #[test]
    fn test_sse_rendering() {
        let inst = Instruction::Movs(
            Precision::Double,
            Operand::Reg(Reg::Xmm(0)),
            Operand::Mem(-16, Reg::Rbp),
        );
        assert_eq!(inst.to_string(), "\tmovsd\t%xmm0, -16(%rbp)");

        let conv = Instruction::Cvtsi2s(
            Precision::Single,
            Operand::Reg(Reg::Eax),
            Operand::Reg(Reg::Xmm(0)),
        );
        assert_eq!(conv.to_string(), "\tcvtsi2ssl\t%eax, %xmm0");
    }

    #[test]
    fn test_branch_rendering() {
        assert_eq!(Instruction::J(Cond::Np, ".L3".into()).to_string(), "\tjnp\t.L3");
        assert_eq!(
            Instruction::Set(Cond::Nae, Operand::Reg(Reg::Al)).to_string(),
            "\tsetnae\t%al"
        );
        assert_eq!(Instruction::Label(".L0".into()).to_string(), ".L0:");
    }
}
