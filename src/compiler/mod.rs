//! Code generator for the C subset.
//!
//! Walks the typed AST once and lowers each node to a fixed x86-64
//! instruction template, following the System V AMD64 ABI. Every expression
//! leaves its result in `%rax` (integers and pointers, sized to the
//! expression's type) or `%xmm0` (floats and doubles); array lvalues decay
//! to their address via `lea`. Binary operators evaluate the left operand
//! first, park it on the stack and combine with `%rcx`/`%xmm1` as scratch.
mod frame;

use std::io::{self, Write};

use log::info;

use crate::{
    asm::{Cond, Instruction, InstructionSize, Operand, Precision, Reg, ARG_REGS},
    parser::{
        ast::{
            Assignment, BinaryExpr, BinaryOp, Block, Call, Constant, Declaration, Expression,
            Function, Initializer, Postfix, PostfixOp, Statement, Str, Ternary, Unary, UnaryOp,
        },
        ast::Ast,
        ctype::CType,
    },
};

use self::frame::{align, Frame};

use Instruction::*;
use Operand::{Imm, Mem, Reg as R, Rip, Sym};
use Reg::*;

/// Where the value to store sits when lowering an assignment.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Src {
    Rax,
    Rcx,
    Xmm0,
}

fn precision(ctype: &CType) -> Precision {
    match ctype {
        CType::Float => Precision::Single,
        CType::Double => Precision::Double,
        _ => unreachable!("no SSE precision for {ctype:?}"),
    }
}

/// Re-escape an already-unescaped string body for a `.string` directive.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.bytes() {
        match c {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x07 => out.push_str("\\007"),
            0x08 => out.push_str("\\b"),
            0x0c => out.push_str("\\f"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x0b => out.push_str("\\013"),
            _ => out.push(c as char),
        }
    }
    out
}

pub struct Compiler {
    ast: Ast,
    instructions: Vec<Instruction>,
    /// Distance in bytes between `%rsp` and `%rbp` in the function being
    /// emitted. Balanced push/pop keeps it exact, which is what the
    /// 16-byte call alignment relies on.
    offset: i64,
    jump_label: usize,
    data_label: usize,
    frame: Frame,
    // shared .rodata constants, generated on first use
    float_one: Option<String>,
    double_one: Option<String>,
    float_sign_mask: Option<String>,
    double_sign_mask: Option<String>,
}

impl Compiler {
    pub fn from_ast(ast: Ast) -> Self {
        Self {
            ast,
            instructions: vec![],
            offset: 0,
            jump_label: 0,
            data_label: 0,
            frame: Frame::default(),
            float_one: None,
            double_one: None,
            float_sign_mask: None,
            double_sign_mask: None,
        }
    }

    /// Emit the whole translation unit into `out`.
    pub fn compile_program(&mut self, out: &mut impl Write) -> io::Result<()> {
        info!("Generating code...");

        let nodes = self.ast.nodes().to_vec();
        for func in &nodes {
            if let Some(body) = &func.body {
                self.emit_func_def(func, body);
            }
        }

        for instruction in &self.instructions {
            writeln!(out, "{instruction}")?;
        }
        Ok(())
    }

    fn emit(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn make_jump_label(&mut self) -> String {
        let label = format!(".L{}", self.jump_label);
        self.jump_label += 1;
        label
    }

    fn make_data_label(&mut self) -> String {
        let label = format!(".LC{}", self.data_label);
        self.data_label += 1;
        label
    }

    fn push(&mut self, src: Operand) {
        self.emit(Push(src));
        self.offset += 8;
    }

    fn pop(&mut self, dst: Operand) {
        self.emit(Pop(dst));
        self.offset -= 8;
    }

    fn push_xmm(&mut self, n: u8) {
        self.emit(Sub(InstructionSize::Quad, Imm(8), R(Rsp)));
        self.emit(Movs(Precision::Double, R(Xmm(n)), Mem(0, Rsp)));
        self.offset += 8;
    }

    fn pop_xmm(&mut self, n: u8) {
        self.emit(Movs(Precision::Double, Mem(0, Rsp), R(Xmm(n))));
        self.emit(Add(InstructionSize::Quad, Imm(8), R(Rsp)));
        self.offset -= 8;
    }

    /// Assign frame offsets to a group of variables and round the frame up
    /// to a multiple of 8.
    fn assign_var_offsets(&mut self, vars: &[(String, CType)]) {
        for (name, ctype) in vars {
            let basis = match ctype {
                CType::Pointer(_) | CType::Array(_, _) => 8,
                other => (other.size() as i64).max(4),
            };
            self.offset = align(self.offset + ctype.alloc_size() as i64, basis);
            self.frame.insert(name, self.offset);
        }
        self.offset = align(self.offset, 8);
    }

    /* functions */

    fn emit_func_def(&mut self, func: &Function, body: &Block) {
        self.emit(Directive(".text".into()));
        self.emit(Directive(format!(".globl\t{}", func.name)));
        self.emit(Directive(format!(".type\t{}, @function", func.name)));
        self.emit(Label(func.name.clone()));
        self.emit(Push(R(Rbp)));
        self.emit(Mov(InstructionSize::Quad, R(Rsp), R(Rbp)));

        self.offset = 0;
        self.frame.push();
        let params: Vec<(String, CType)> = func
            .params
            .iter()
            .map(|p| (p.name.clone(), p.ctype.clone()))
            .collect();
        self.assign_var_offsets(&params);
        if self.offset != 0 {
            self.emit(Sub(InstructionSize::Quad, Imm(self.offset), R(Rsp)));
        }

        // copy the incoming argument registers into their frame slots
        let mut int_idx = 0;
        let mut float_idx = 0;
        for param in &func.params {
            let loffset = self.frame.lookup(&param.name);
            if param.ctype.is_float() {
                self.emit(Movs(
                    precision(&param.ctype),
                    R(Xmm(float_idx)),
                    Mem(-loffset, Rbp),
                ));
                float_idx += 1;
            } else {
                let size = param.ctype.size();
                self.emit(Mov(
                    size.into(),
                    R(ARG_REGS[int_idx].to_sized(size)),
                    Mem(-loffset, Rbp),
                ));
                int_idx += 1;
            }
        }

        self.emit_compound_stmt(body);
        self.emit(Leave);
        self.emit(Ret);
        self.frame.pop();
    }

    /* statements */

    fn emit_stmt(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Expression(expr) => self.emit_expr(expr),
            Statement::Declaration(decl) => self.emit_declaration(decl),
            Statement::Compound(block) => self.emit_compound_stmt(block),
            Statement::If(if_stmt) => self.emit_if(if_stmt),
            Statement::For(for_stmt) => self.emit_for(for_stmt),
            Statement::While(while_stmt) => self.emit_while(while_stmt),
            Statement::DoWhile(do_while) => self.emit_do_while(do_while),
            Statement::Return(ret) => {
                if let Some(value) = &ret.value {
                    self.emit_expr(value);
                }
                self.emit(Leave);
                self.emit(Ret);
            }
            Statement::Empty => {}
        }
    }

    /// Collect the declarations of this compound statement, extend the frame
    /// for them, emit the body and give the space back on exit.
    fn emit_compound_stmt(&mut self, block: &Block) {
        let prev_offset = self.offset;
        self.frame.push();

        let mut vars = vec![];
        for stmt in &block.statements {
            if let Statement::Declaration(decl) = stmt {
                for d in &decl.declarators {
                    vars.push((d.name.clone(), d.ctype.clone()));
                }
            }
        }
        self.assign_var_offsets(&vars);

        let delta = self.offset - prev_offset;
        if delta != 0 {
            self.emit(Sub(InstructionSize::Quad, Imm(delta), R(Rsp)));
        }
        for stmt in &block.statements {
            self.emit_stmt(stmt);
        }
        if delta != 0 {
            self.emit(Add(InstructionSize::Quad, Imm(delta), R(Rsp)));
            self.offset = prev_offset;
        }

        self.frame.pop();
    }

    fn emit_declaration(&mut self, decl: &Declaration) {
        for declarator in &decl.declarators {
            let Some(init) = &declarator.init else {
                continue;
            };
            let loffset = self.frame.lookup(&declarator.name);
            match init {
                Initializer::Scalar(expr) => {
                    self.emit_expr(expr);
                    if declarator.ctype.is_float() {
                        self.emit(Movs(
                            precision(&declarator.ctype),
                            R(Xmm(0)),
                            Mem(-loffset, Rbp),
                        ));
                    } else {
                        let size = declarator.ctype.size();
                        self.emit(Mov(size.into(), R(Rax.to_sized(size)), Mem(-loffset, Rbp)));
                    }
                }
                Initializer::List(inits) => {
                    let CType::Array(elem, len) = &declarator.ctype else {
                        unreachable!("list initializer on a non-array");
                    };
                    let elem = (**elem).clone();
                    let len = *len;
                    let size = elem.size();
                    let mut loffset = loffset;
                    for init in inits {
                        self.emit_expr(init);
                        if elem.is_float() {
                            self.emit(Movs(precision(&elem), R(Xmm(0)), Mem(-loffset, Rbp)));
                        } else {
                            self.emit(Mov(size.into(), R(Rax.to_sized(size)), Mem(-loffset, Rbp)));
                        }
                        loffset -= size as i64;
                    }
                    // missing trailing elements are zero-filled
                    for _ in inits.len()..len {
                        self.emit(Mov(size.into(), Imm(0), Mem(-loffset, Rbp)));
                        loffset -= size as i64;
                    }
                }
            }
        }
    }

    /* control flow */

    /// Evaluate an expression and set the flags for a branch against zero.
    fn emit_cmp_0(&mut self, expr: &Expression) {
        self.emit_expr(expr);
        if expr.ctype().is_float() {
            let p = precision(expr.ctype());
            self.emit(Xorp(p, R(Xmm(1)), R(Xmm(1))));
            self.emit(Ucomis(p, R(Xmm(0)), R(Xmm(1))));
        } else {
            let size = expr.ctype().size();
            let reg = R(Rax.to_sized(size));
            self.emit(Test(size.into(), reg.clone(), reg));
        }
    }

    /// The condition code that branches to the false arm after
    /// [`Self::emit_cmp_0`].
    fn false_jump(ctype: &CType) -> Cond {
        if ctype.is_float() {
            Cond::Np
        } else {
            Cond::E
        }
    }

    fn true_jump(ctype: &CType) -> Cond {
        if ctype.is_float() {
            Cond::P
        } else {
            Cond::Ne
        }
    }

    fn emit_if(&mut self, if_stmt: &crate::parser::ast::If) {
        self.emit_cmp_0(&if_stmt.cond);
        let false_label = self.make_jump_label();
        self.emit(J(Self::false_jump(if_stmt.cond.ctype()), false_label.clone()));
        self.emit_stmt(&if_stmt.then_branch);
        if let Some(else_branch) = &if_stmt.else_branch {
            let done_label = self.make_jump_label();
            self.emit(Jmp(done_label.clone()));
            self.emit(Label(false_label));
            self.emit_stmt(else_branch);
            self.emit(Label(done_label));
        } else {
            self.emit(Label(false_label));
        }
    }

    fn emit_for(&mut self, for_stmt: &crate::parser::ast::For) {
        if let Some(init) = &for_stmt.init {
            self.emit_expr(init);
        }
        let test_label = self.make_jump_label();
        self.emit(Jmp(test_label.clone()));
        let loop_label = self.make_jump_label();
        self.emit(Label(loop_label.clone()));
        self.emit_stmt(&for_stmt.body);
        if let Some(step) = &for_stmt.step {
            self.emit_expr(step);
        }
        self.emit(Label(test_label));
        match &for_stmt.cond {
            Some(cond) => {
                self.emit_cmp_0(cond);
                self.emit(J(Self::true_jump(cond.ctype()), loop_label));
            }
            None => self.emit(Jmp(loop_label)),
        }
    }

    fn emit_while(&mut self, while_stmt: &crate::parser::ast::While) {
        let test_label = self.make_jump_label();
        self.emit(Jmp(test_label.clone()));
        let loop_label = self.make_jump_label();
        self.emit(Label(loop_label.clone()));
        self.emit_stmt(&while_stmt.body);
        self.emit(Label(test_label));
        self.emit_cmp_0(&while_stmt.cond);
        self.emit(J(Self::true_jump(while_stmt.cond.ctype()), loop_label));
    }

    fn emit_do_while(&mut self, do_while: &crate::parser::ast::DoWhile) {
        let loop_label = self.make_jump_label();
        self.emit(Label(loop_label.clone()));
        self.emit_stmt(&do_while.body);
        self.emit_cmp_0(&do_while.cond);
        self.emit(J(Self::true_jump(do_while.cond.ctype()), loop_label));
    }

    /* expressions */

    fn emit_expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Constant(constant) => self.emit_constant(constant),
            Expression::Str(string) => self.emit_string(string),
            Expression::Id(id) => {
                let loffset = self.frame.lookup(&id.name);
                if id.ctype.is_float() {
                    self.emit(Movs(precision(&id.ctype), Mem(-loffset, Rbp), R(Xmm(0))));
                } else if matches!(id.ctype, CType::Array(_, _)) {
                    // decay: the value of an array is its address
                    self.emit(Lea(InstructionSize::Quad, Mem(-loffset, Rbp), R(Rax)));
                } else {
                    let size = id.ctype.size();
                    self.emit(Mov(size.into(), Mem(-loffset, Rbp), R(Rax.to_sized(size))));
                }
            }
            Expression::Unary(unary) => self.emit_unary(unary),
            Expression::Postfix(postfix) => {
                if postfix.ctype.is_float() {
                    self.emit_float_postfix_inc_dec(postfix);
                } else {
                    self.emit_postfix_inc_dec(postfix);
                }
            }
            Expression::Binary(binary) => self.emit_binary(binary),
            Expression::Ternary(ternary) => self.emit_ternary(ternary),
            Expression::Assignment(assignment) => self.emit_assignment(assignment),
            Expression::Call(call) => self.emit_func_call(call),
            Expression::Cast(cast) => {
                self.emit_expr(&cast.expr);
                self.emit_conv(cast.expr.ctype(), &cast.ctype);
            }
            Expression::ArithConv(conv) => {
                self.emit_expr(&conv.expr);
                self.emit_conv(conv.expr.ctype(), &conv.ctype);
            }
        }
    }

    fn emit_constant(&mut self, constant: &Constant) {
        match constant {
            Constant::Int { value, ctype } => {
                let size = ctype.size();
                self.emit(Mov(size.into(), Imm(*value), R(Rax.to_sized(size))));
            }
            Constant::Float { value, ctype } => {
                let label = self.make_data_label();
                self.emit(Directive(".section\t.rodata".into()));
                self.emit(Directive(format!(".align\t{}", ctype.size())));
                self.emit(Label(label.clone()));
                if *ctype == CType::Float {
                    self.emit(Directive(format!(".long\t{}", (*value as f32).to_bits())));
                } else {
                    self.emit(Directive(format!(".quad\t{}", value.to_bits())));
                }
                self.emit(Directive(".text".into()));
                self.emit(Movs(precision(ctype), Rip(label), R(Xmm(0))));
            }
        }
    }

    fn emit_string(&mut self, string: &Str) {
        let label = self.make_data_label();
        self.emit(Directive(".section\t.rodata".into()));
        self.emit(Label(label.clone()));
        self.emit(Directive(format!(".string\t\"{}\"", escape(&string.value))));
        self.emit(Directive(".text".into()));
        self.emit(Mov(InstructionSize::Quad, Sym(label), R(Rax)));
    }

    /// The label of a `1.0` constant of the given precision, emitted into
    /// `.rodata` on first use (float and double `++`/`--`).
    fn float_one_label(&mut self, ctype: &CType) -> String {
        let slot = match ctype {
            CType::Float => &mut self.float_one,
            _ => &mut self.double_one,
        };
        if let Some(label) = slot {
            return label.clone();
        }

        let label = self.make_data_label();
        self.emit(Directive(".section\t.rodata".into()));
        self.emit(Label(label.clone()));
        if *ctype == CType::Float {
            self.emit(Directive(format!(".long\t{}", 1.0f32.to_bits())));
            self.float_one = Some(label.clone());
        } else {
            self.emit(Directive(format!(".quad\t{}", 1.0f64.to_bits())));
            self.double_one = Some(label.clone());
        }
        self.emit(Directive(".text".into()));
        label
    }

    /// The label of the sign-bit mask used by floating negation, emitted
    /// into `.rodata` on first use.
    fn sign_mask_label(&mut self, ctype: &CType) -> String {
        let slot = match ctype {
            CType::Float => &mut self.float_sign_mask,
            _ => &mut self.double_sign_mask,
        };
        if let Some(label) = slot {
            return label.clone();
        }

        let label = self.make_data_label();
        self.emit(Directive(".section\t.rodata".into()));
        self.emit(Directive(".align\t16".into()));
        self.emit(Label(label.clone()));
        if *ctype == CType::Float {
            self.emit(Directive(".long\t2147483648".into()));
            self.emit(Directive(".long\t0".into()));
            self.float_sign_mask = Some(label.clone());
        } else {
            self.emit(Directive(".long\t0".into()));
            self.emit(Directive(".long\t2147483648".into()));
            self.double_sign_mask = Some(label.clone());
        }
        self.emit(Directive(".long\t0".into()));
        self.emit(Directive(".long\t0".into()));
        self.emit(Directive(".text".into()));
        label
    }

    fn emit_unary(&mut self, unary: &Unary) {
        match unary.op {
            UnaryOp::Inc | UnaryOp::Dec => {
                if unary.ctype.is_float() {
                    self.emit_float_prefix_inc_dec(unary);
                } else {
                    self.emit_prefix_inc_dec(unary);
                }
            }
            UnaryOp::Plus => self.emit_expr(&unary.operand),
            UnaryOp::Neg => {
                if unary.ctype.is_float() {
                    self.emit_float_neg(unary);
                } else {
                    let size = unary.operand.ctype().size();
                    self.emit_expr(&unary.operand);
                    self.emit(Neg(size.into(), R(Rax.to_sized(size))));
                }
            }
            UnaryOp::BitNot => {
                let size = unary.operand.ctype().size();
                self.emit_expr(&unary.operand);
                self.emit(Not(size.into(), R(Rax.to_sized(size))));
            }
            UnaryOp::Not => {
                self.emit_cmp_0(&unary.operand);
                let cc = if unary.operand.ctype().is_float() {
                    Cond::Np
                } else {
                    Cond::E
                };
                self.emit(Set(cc, R(Al)));
                self.emit(Movzbl(R(Al), R(Eax)));
            }
            UnaryOp::Addr => self.emit_addr(unary),
            UnaryOp::Deref => self.emit_deref(unary),
        }
    }

    fn emit_addr(&mut self, unary: &Unary) {
        match &unary.operand {
            Expression::Id(id) => {
                let loffset = self.frame.lookup(&id.name);
                let size = unary.ctype.size();
                self.emit(Lea(size.into(), Mem(-loffset, Rbp), R(Rax.to_sized(size))));
            }
            // &*e: both operators are omitted
            Expression::Unary(inner) if inner.op == UnaryOp::Deref => {
                self.emit_expr(&inner.operand);
            }
            _ => unreachable!("'&' operand was checked to be an lvalue"),
        }
    }

    fn emit_deref(&mut self, unary: &Unary) {
        self.emit_expr(&unary.operand);
        if unary.ctype.is_float() {
            self.emit(Movs(precision(&unary.ctype), Mem(0, Rax), R(Xmm(0))));
        } else {
            let size = unary.ctype.size();
            self.emit(Mov(size.into(), Mem(0, Rax), R(Rax.to_sized(size))));
        }
    }

    fn emit_float_neg(&mut self, unary: &Unary) {
        let label = self.sign_mask_label(&unary.ctype);
        let p = precision(&unary.ctype);
        self.emit_expr(&unary.operand);
        self.emit(Movs(p, Rip(label), R(Xmm(1))));
        self.emit(Xorp(p, R(Xmm(1)), R(Xmm(0))));
    }

    fn inc_dec_delta(operand: &Expression) -> i64 {
        match operand.ctype().pointee() {
            Some(pointee) => pointee.size() as i64,
            None => 1,
        }
    }

    fn emit_prefix_inc_dec(&mut self, unary: &Unary) {
        self.emit_expr(&unary.operand);
        let size = unary.ctype.size();
        let delta = Self::inc_dec_delta(&unary.operand);
        let reg = R(Rax.to_sized(size));
        if unary.op == UnaryOp::Inc {
            self.emit(Add(size.into(), Imm(delta), reg));
        } else {
            self.emit(Sub(size.into(), Imm(delta), reg));
        }
        self.emit_assign(&unary.operand, Src::Rax);
    }

    fn emit_postfix_inc_dec(&mut self, postfix: &Postfix) {
        self.emit_expr(&postfix.operand);
        let size = postfix.ctype.size();
        let delta = Self::inc_dec_delta(&postfix.operand);
        self.emit(Mov(size.into(), R(Rax.to_sized(size)), R(Rcx.to_sized(size))));
        let reg = R(Rcx.to_sized(size));
        if postfix.op == PostfixOp::Inc {
            self.emit(Add(size.into(), Imm(delta), reg));
        } else {
            self.emit(Sub(size.into(), Imm(delta), reg));
        }
        // the un-incremented value stays in %rax
        self.emit_assign(&postfix.operand, Src::Rcx);
    }

    fn emit_float_prefix_inc_dec(&mut self, unary: &Unary) {
        let p = precision(&unary.ctype);
        self.emit_expr(&unary.operand);
        let label = self.float_one_label(&unary.ctype);
        self.emit(Movs(p, Rip(label), R(Xmm(1))));
        if unary.op == UnaryOp::Inc {
            self.emit(Adds(p, R(Xmm(1)), R(Xmm(0))));
        } else {
            self.emit(Subs(p, R(Xmm(1)), R(Xmm(0))));
        }
        self.emit_assign(&unary.operand, Src::Xmm0);
    }

    fn emit_float_postfix_inc_dec(&mut self, postfix: &Postfix) {
        let p = precision(&postfix.ctype);
        self.emit_expr(&postfix.operand);
        let label = self.float_one_label(&postfix.ctype);
        self.push_xmm(0);
        self.emit(Movs(p, Rip(label), R(Xmm(1))));
        if postfix.op == PostfixOp::Inc {
            self.emit(Adds(p, R(Xmm(1)), R(Xmm(0))));
        } else {
            self.emit(Subs(p, R(Xmm(1)), R(Xmm(0))));
        }
        self.emit_assign(&postfix.operand, Src::Xmm0);
        self.pop_xmm(0);
    }

    /* binary operators */

    fn emit_binary(&mut self, binary: &BinaryExpr) {
        match binary.op {
            BinaryOp::BitAnd | BinaryOp::BitXor | BinaryOp::BitOr => {
                self.emit_bit_binary(binary);
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
                if binary.ctype.is_float() =>
            {
                self.emit_float_arith_binary(binary);
            }
            BinaryOp::Add | BinaryOp::Sub if binary.lhs.ctype().is_ptr() => {
                self.emit_ptr_arith_binary(binary);
            }
            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::Shl
            | BinaryOp::Shr => self.emit_arith_binary(binary),
            BinaryOp::LogAnd => self.emit_log_and(binary),
            BinaryOp::LogOr => self.emit_log_or(binary),
            op if op.is_comparison() => {
                if binary.lhs.ctype().is_float() {
                    self.emit_float_cmp_binary(binary);
                } else {
                    self.emit_cmp_binary(binary);
                }
            }
            BinaryOp::Comma => {
                self.emit_expr(&binary.lhs);
                self.emit_expr(&binary.rhs);
            }
            op => unreachable!("unhandled binary operator {op}"),
        }
    }

    fn emit_bit_binary(&mut self, binary: &BinaryExpr) {
        let size = binary.ctype.size();
        self.emit_expr(&binary.lhs);
        self.push(R(Rax));
        self.emit_expr(&binary.rhs);
        self.pop(R(Rcx));
        let src = R(Rcx.to_sized(size));
        let dst = R(Rax.to_sized(size));
        match binary.op {
            BinaryOp::BitAnd => self.emit(And(size.into(), src, dst)),
            BinaryOp::BitXor => self.emit(Xor(size.into(), src, dst)),
            BinaryOp::BitOr => self.emit(Or(size.into(), src, dst)),
            op => unreachable!("not a bit operator: {op}"),
        }
    }

    fn emit_arith_binary(&mut self, binary: &BinaryExpr) {
        let size = binary.ctype.size();
        let isize = InstructionSize::from(size);
        match binary.op {
            // operand order matters: the left value must end up in %rax
            BinaryOp::Sub | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Shl | BinaryOp::Shr => {
                self.emit_expr(&binary.lhs);
                self.push(R(Rax));
                self.emit_expr(&binary.rhs);
                self.emit(Mov(isize, R(Rax.to_sized(size)), R(Rcx.to_sized(size))));
                self.pop(R(Rax));
                match binary.op {
                    BinaryOp::Sub => {
                        self.emit(Sub(isize, R(Rcx.to_sized(size)), R(Rax.to_sized(size))));
                    }
                    BinaryOp::Div | BinaryOp::Mod => {
                        if size == 8 {
                            self.emit(Cqto);
                        } else {
                            self.emit(Cltd);
                        }
                        self.emit(Idiv(isize, R(Rcx.to_sized(size))));
                        if binary.op == BinaryOp::Mod {
                            self.emit(Mov(isize, R(Rdx.to_sized(size)), R(Rax.to_sized(size))));
                        }
                    }
                    BinaryOp::Shl => self.emit(Sal(isize, R(Cl), R(Rax.to_sized(size)))),
                    BinaryOp::Shr => self.emit(Sar(isize, R(Cl), R(Rax.to_sized(size)))),
                    op => unreachable!("not an ordered operator: {op}"),
                }
            }
            BinaryOp::Add | BinaryOp::Mul => {
                self.emit_expr(&binary.lhs);
                self.push(R(Rax));
                self.emit_expr(&binary.rhs);
                self.pop(R(Rcx));
                let src = R(Rcx.to_sized(size));
                let dst = R(Rax.to_sized(size));
                if binary.op == BinaryOp::Add {
                    self.emit(Add(isize, src, dst));
                } else {
                    self.emit(Imul(isize, src, dst));
                }
            }
            op => unreachable!("not an arithmetic operator: {op}"),
        }
    }

    /// Pointer arithmetic: scale the integer side by the pointee size. The
    /// parser normalised `int + ptr`, so the pointer is always the left
    /// operand.
    fn emit_ptr_arith_binary(&mut self, binary: &BinaryExpr) {
        let pointee_size = binary
            .lhs
            .ctype()
            .pointee()
            .map(|p| p.size())
            .unwrap_or(1) as i64;

        self.emit_expr(&binary.lhs);
        self.push(R(Rax));
        self.emit_expr(&binary.rhs);
        self.pop(R(Rcx));

        if binary.rhs.ctype().is_ptr() {
            // ptr - ptr: difference scaled down to an element count
            self.emit(Sub(InstructionSize::Quad, R(Rax), R(Rcx)));
            self.emit(Mov(InstructionSize::Quad, R(Rcx), R(Rax)));
            if pointee_size > 1 {
                if pointee_size.count_ones() == 1 {
                    let shift = pointee_size.trailing_zeros() as i64;
                    self.emit(Sar(InstructionSize::Quad, Imm(shift), R(Rax)));
                } else {
                    self.emit(Mov(InstructionSize::Quad, Imm(pointee_size), R(Rcx)));
                    self.emit(Cqto);
                    self.emit(Idiv(InstructionSize::Quad, R(Rcx)));
                }
            }
        } else {
            // ptr +- int: sign-extend the index, scale, combine
            self.emit(Cltq);
            if pointee_size > 1 {
                if pointee_size.count_ones() == 1 {
                    let shift = pointee_size.trailing_zeros() as i64;
                    self.emit(Sal(InstructionSize::Quad, Imm(shift), R(Rax)));
                } else {
                    self.emit(Imul(InstructionSize::Quad, Imm(pointee_size), R(Rax)));
                }
            }
            if binary.op == BinaryOp::Sub {
                self.emit(Sub(InstructionSize::Quad, R(Rax), R(Rcx)));
            } else {
                self.emit(Add(InstructionSize::Quad, R(Rax), R(Rcx)));
            }
            self.emit(Mov(InstructionSize::Quad, R(Rcx), R(Rax)));
        }
    }

    fn emit_float_arith_binary(&mut self, binary: &BinaryExpr) {
        let p = precision(&binary.ctype);
        if matches!(binary.op, BinaryOp::Add | BinaryOp::Mul) {
            self.emit_expr(&binary.lhs);
            self.push_xmm(0);
            self.emit_expr(&binary.rhs);
            self.pop_xmm(1);
            if binary.op == BinaryOp::Add {
                self.emit(Adds(p, R(Xmm(1)), R(Xmm(0))));
            } else {
                self.emit(Muls(p, R(Xmm(1)), R(Xmm(0))));
            }
        } else {
            self.emit_expr(&binary.lhs);
            self.push_xmm(0);
            self.emit_expr(&binary.rhs);
            self.emit(Movs(p, R(Xmm(0)), R(Xmm(1))));
            self.pop_xmm(0);
            if binary.op == BinaryOp::Sub {
                self.emit(Subs(p, R(Xmm(1)), R(Xmm(0))));
            } else {
                self.emit(Divs(p, R(Xmm(1)), R(Xmm(0))));
            }
        }
    }

    fn emit_log_and(&mut self, binary: &BinaryExpr) {
        self.emit_cmp_0(&binary.lhs);
        let false_label = self.make_jump_label();
        self.emit(J(Self::false_jump(binary.lhs.ctype()), false_label.clone()));
        self.emit_cmp_0(&binary.rhs);
        self.emit(J(Self::false_jump(binary.rhs.ctype()), false_label.clone()));

        self.emit(Mov(InstructionSize::Long, Imm(1), R(Eax)));
        let done_label = self.make_jump_label();
        self.emit(Jmp(done_label.clone()));
        self.emit(Label(false_label));
        self.emit(Mov(InstructionSize::Long, Imm(0), R(Eax)));
        self.emit(Label(done_label));
    }

    fn emit_log_or(&mut self, binary: &BinaryExpr) {
        self.emit_cmp_0(&binary.lhs);
        let true_label = self.make_jump_label();
        self.emit(J(Self::true_jump(binary.lhs.ctype()), true_label.clone()));
        self.emit_cmp_0(&binary.rhs);
        self.emit(J(Self::true_jump(binary.rhs.ctype()), true_label.clone()));

        self.emit(Mov(InstructionSize::Long, Imm(0), R(Eax)));
        let done_label = self.make_jump_label();
        self.emit(Jmp(done_label.clone()));
        self.emit(Label(true_label));
        self.emit(Mov(InstructionSize::Long, Imm(1), R(Eax)));
        self.emit(Label(done_label));
    }

    fn emit_cmp_binary(&mut self, binary: &BinaryExpr) {
        let cc = match binary.op {
            BinaryOp::Lt => Cond::L,
            BinaryOp::Gt => Cond::G,
            BinaryOp::Le => Cond::Le,
            BinaryOp::Ge => Cond::Ge,
            BinaryOp::Eq => Cond::E,
            BinaryOp::Ne => Cond::Ne,
            op => unreachable!("not a comparison: {op}"),
        };

        self.emit_expr(&binary.lhs);
        self.push(R(Rax));
        self.emit_expr(&binary.rhs);
        self.pop(R(Rcx));
        // left in %rcx, right in %rax: cmp computes left - right
        let size = binary.lhs.ctype().size();
        self.emit(Cmp(size.into(), R(Rax.to_sized(size)), R(Rcx.to_sized(size))));
        self.emit(Set(cc, R(Al)));
        self.emit(Movzbl(R(Al), R(Eax)));
    }

    fn emit_float_cmp_binary(&mut self, binary: &BinaryExpr) {
        // unordered-aware condition codes; == is `setnp` so NaN compares unequal
        let cc = match binary.op {
            BinaryOp::Lt => Cond::Na,
            BinaryOp::Gt => Cond::A,
            BinaryOp::Le => Cond::Nae,
            BinaryOp::Ge => Cond::Ae,
            BinaryOp::Eq => Cond::Np,
            BinaryOp::Ne => Cond::P,
            op => unreachable!("not a comparison: {op}"),
        };

        let p = precision(binary.lhs.ctype());
        self.emit_expr(&binary.lhs);
        self.push_xmm(0);
        self.emit_expr(&binary.rhs);
        self.pop_xmm(1);
        self.emit(Ucomis(p, R(Xmm(0)), R(Xmm(1))));
        self.emit(Set(cc, R(Al)));
        self.emit(Movzbl(R(Al), R(Eax)));
    }

    fn emit_ternary(&mut self, ternary: &Ternary) {
        self.emit_cmp_0(&ternary.cond);
        let false_label = self.make_jump_label();
        self.emit(J(Self::false_jump(ternary.cond.ctype()), false_label.clone()));
        self.emit_expr(&ternary.then_expr);
        let done_label = self.make_jump_label();
        self.emit(Jmp(done_label.clone()));
        self.emit(Label(false_label));
        self.emit_expr(&ternary.else_expr);
        self.emit(Label(done_label));
    }

    /* assignment */

    fn emit_assignment(&mut self, assignment: &Assignment) {
        self.emit_expr(&assignment.rhs);
        let src = if assignment.ctype.is_float() {
            Src::Xmm0
        } else {
            Src::Rax
        };
        self.emit_assign(&assignment.lhs, src);
    }

    /// Store the value in `src` into the lvalue `dst`. The stored value is
    /// left in place, which makes assignment usable as an expression.
    fn emit_assign(&mut self, dst: &Expression, src: Src) {
        if dst.ctype().is_float() {
            let p = precision(dst.ctype());
            match dst {
                Expression::Id(id) => {
                    let loffset = self.frame.lookup(&id.name);
                    self.emit(Movs(p, R(Xmm(0)), Mem(-loffset, Rbp)));
                }
                Expression::Unary(inner) if inner.op == UnaryOp::Deref => {
                    self.emit_expr(&inner.operand);
                    self.emit(Movs(p, R(Xmm(0)), Mem(0, Rax)));
                }
                _ => unreachable!("assignment target was checked to be an lvalue"),
            }
            return;
        }

        let size = dst.ctype().size();
        match dst {
            Expression::Id(id) => {
                let loffset = self.frame.lookup(&id.name);
                let reg = match src {
                    Src::Rcx => Rcx.to_sized(size),
                    _ => Rax.to_sized(size),
                };
                self.emit(Mov(size.into(), R(reg), Mem(-loffset, Rbp)));
            }
            Expression::Unary(inner) if inner.op == UnaryOp::Deref => match src {
                Src::Rax => {
                    self.push(R(Rax));
                    self.emit_expr(&inner.operand);
                    self.emit(Mov(InstructionSize::Quad, R(Rax), R(Rcx)));
                    self.pop(R(Rax));
                    self.emit(Mov(size.into(), R(Rax.to_sized(size)), Mem(0, Rcx)));
                }
                Src::Rcx => {
                    self.emit_expr(&inner.operand);
                    self.emit(Mov(size.into(), R(Rcx.to_sized(size)), Mem(0, Rax)));
                }
                Src::Xmm0 => unreachable!("float source for an integer assignment"),
            },
            _ => unreachable!("assignment target was checked to be an lvalue"),
        }
    }

    /* conversions */

    /// Arithmetic conversion of the value in `%rax`/`%xmm0`. Scalar SSE
    /// forms only; the integer operand width is 32 bits.
    fn emit_conv(&mut self, from: &CType, to: &CType) {
        if from == to {
            return;
        }
        match (from, to) {
            (CType::Int, CType::Float) => {
                self.emit(Cvtsi2s(Precision::Single, R(Eax), R(Xmm(0))));
            }
            (CType::Int, CType::Double) => {
                self.emit(Cvtsi2s(Precision::Double, R(Eax), R(Xmm(0))));
            }
            (CType::Float, CType::Int) => {
                self.emit(Cvtts2si(Precision::Single, R(Xmm(0)), R(Eax)));
            }
            (CType::Double, CType::Int) => {
                self.emit(Cvtts2si(Precision::Double, R(Xmm(0)), R(Eax)));
            }
            (CType::Float, CType::Double) => self.emit(Cvtss2sd(R(Xmm(0)), R(Xmm(0)))),
            (CType::Double, CType::Float) => self.emit(Cvtsd2ss(R(Xmm(0)), R(Xmm(0)))),
            (CType::Char, to) if to.is_arith() => {
                // widen the byte first, then convert as from int
                self.emit(Movzbl(R(Al), R(Eax)));
                self.emit_conv(&CType::Int, to);
            }
            // pointer casts and int/char narrowing take no code
            _ => {}
        }
    }

    /* calls */

    /// System V call sequence: stage the arguments on the stack in reverse,
    /// pop them into the argument registers in order, align `%rsp` to 16
    /// bytes and call.
    fn emit_func_call(&mut self, call: &Call) {
        for arg in call.args.iter().rev() {
            self.emit_expr(arg);
            if arg.ctype().is_float() {
                self.push_xmm(0);
            } else {
                self.push(R(Rax));
            }
        }

        let mut int_idx = 0;
        let mut float_idx: u8 = 0;
        for arg in &call.args {
            if arg.ctype().is_float() {
                self.pop_xmm(float_idx);
                float_idx += 1;
            } else {
                self.pop(R(ARG_REGS[int_idx]));
                int_idx += 1;
            }
        }

        // variadic callees expect the float register count in %al
        if call.variadic {
            self.emit(Mov(InstructionSize::Long, Imm(float_idx as i64), R(Eax)));
        }

        if self.offset % 16 != 0 {
            let pad = align(self.offset, 16) - self.offset;
            self.emit(Sub(InstructionSize::Quad, Imm(pad), R(Rsp)));
            self.emit(Instruction::Call(call.name.clone()));
            self.emit(Add(InstructionSize::Quad, Imm(pad), R(Rsp)));
        } else {
            self.emit(Instruction::Call(call.name.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn compile(src: &str) -> String {
        let ast = Parser::new(Lexer::new("test.c", src))
            .parse()
            .expect("parse failed");
        let mut compiler = Compiler::from_ast(ast);
        let mut buf = Vec::new();
        compiler.compile_program(&mut buf).expect("write failed");
        String::from_utf8(buf).expect("assembly is not utf-8")
    }

    #[test]
    fn test_prologue_and_epilogue() {
        let asm = compile("int main(void) { return 0; }");

        assert!(asm.contains(".globl\tmain"));
        assert!(asm.contains(".type\tmain, @function"));
        assert!(asm.contains("main:"));
        assert!(asm.contains("\tpushq\t%rbp"));
        assert!(asm.contains("\tmovq\t%rsp, %rbp"));
        assert!(asm.contains("\tmovl\t$0, %eax"));
        assert!(asm.contains("\tleave"));
        assert!(asm.contains("\tret"));
    }

    #[test]
    fn test_labels_are_unique() {
        let asm = compile(
            "int main(void) { int i; int s; s = 0; \
             for (i = 0; i < 3; i = i + 1) { if (i) s = s + i; else s = s - 1; } \
             while (s > 0) s = s - 1; do s = s + 1; while (s < 2); return s; }",
        );

        let mut labels: Vec<&str> = asm
            .lines()
            .filter(|l| l.starts_with(".L") && l.ends_with(':'))
            .collect();
        let total = labels.len();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(total, labels.len(), "duplicate label emitted");
        // for: 2, if/else: 2, while: 2, do-while: 1
        assert_eq!(total, 7);
    }

    #[test]
    fn test_push_pop_balance() {
        // one function, integer expressions only: every push is popped except
        // the prologue's %rbp, which `leave` restores
        let asm = compile(
            "int main(void) { int a; int b; a = 1; b = 2; \
             a = a + b * (a - 3) / 2; return a % 3; }",
        );

        let pushes = asm.lines().filter(|l| l.contains("pushq")).count();
        let pops = asm.lines().filter(|l| l.contains("popq")).count();
        assert_eq!(pushes, pops + 1);
    }

    #[test]
    fn test_frame_allocation_is_rounded_to_eight() {
        // one int local: 4 bytes of need, 8 bytes of frame
        let asm = compile("int main(void) { int x; x = 1; return x; }");
        assert!(asm.contains("\tsubq\t$8, %rsp"));
        assert!(asm.contains("\taddq\t$8, %rsp"));
    }

    #[test]
    fn test_call_site_alignment() {
        // frame is 8 bytes deep at the call, so the call site pads by 8
        let asm = compile("int main(void) { int x; x = puts(\"hi\"); return 0; }");

        let call_pos = asm.find("\tcall\tputs").expect("missing call");
        let before = &asm[..call_pos];
        assert!(before.contains("\tsubq\t$8, %rsp"));
        let after = &asm[call_pos..];
        assert!(after.contains("\taddq\t$8, %rsp"));
    }

    #[test]
    fn test_variadic_float_count_in_eax() {
        let asm = compile("int main(void) { printf(\"%f\\n\", 1.5); return 0; }");

        let call_pos = asm.find("\tcall\tprintf").expect("missing call");
        assert!(asm[..call_pos].contains("\tmovl\t$1, %eax"));
    }

    #[test]
    fn test_string_literal_in_rodata() {
        let asm = compile("int main(void) { puts(\"hi\\n\"); return 0; }");

        assert!(asm.contains(".section\t.rodata"));
        assert!(asm.contains(".string\t\"hi\\n\""));
        assert!(asm.contains("\tmovq\t$.LC0, %rax"));
    }

    #[test]
    fn test_double_literal_bits() {
        let asm = compile("int main(void) { double x; x = 1.5; return 0; }");

        assert!(asm.contains(&format!(".quad\t{}", 1.5f64.to_bits())));
        assert!(asm.contains("\tmovsd\t.LC0(%rip), %xmm0"));
        assert!(asm.contains("\tmovsd\t%xmm0, -8(%rbp)"));
    }

    #[test]
    fn test_float_literal_uses_long() {
        let asm = compile("int main(void) { float x; x = 1.5f; return 0; }");
        assert!(asm.contains(&format!(".long\t{}", 1.5f32.to_bits())));
        assert!(asm.contains("\tmovss\t.LC0(%rip), %xmm0"));
    }

    #[test]
    fn test_pointer_scaling_is_a_shift() {
        let asm = compile("int main(void) { int a; int *p; p = &a; p = p + 2; return 0; }");

        assert!(asm.contains("\tcltq"));
        assert!(asm.contains("\tsalq\t$2, %rax"));
    }

    #[test]
    fn test_pointer_difference_scales_down() {
        let asm =
            compile("int main(void) { int a; int *p; int *q; p = &a; q = p; return p - q; }");
        assert!(asm.contains("\tsarq\t$2, %rax"));
    }

    #[test]
    fn test_float_negation_uses_sign_mask() {
        let asm = compile("int main(void) { double d; d = 1.0; d = -d; return 0; }");

        assert!(asm.contains("\txorpd\t%xmm1, %xmm0"));
        assert!(asm.contains(".align\t16"));
        assert!(asm.contains(".long\t2147483648"));
    }

    #[test]
    fn test_division_sign_extends() {
        let asm = compile("int main(void) { int a; a = 7; return a / 2; }");

        assert!(asm.contains("\tcltd"));
        assert!(asm.contains("\tidivl\t%ecx"));
    }

    #[test]
    fn test_modulo_takes_remainder_from_edx() {
        let asm = compile("int main(void) { int a; a = 7; return a % 3; }");
        assert!(asm.contains("\tmovl\t%edx, %eax"));
    }

    #[test]
    fn test_comparison_sets_flags_then_extends() {
        let asm = compile("int main(void) { int a; a = 1; return a < 2; }");

        assert!(asm.contains("\tsetl\t%al"));
        assert!(asm.contains("\tmovzbl\t%al, %eax"));
    }

    #[test]
    fn test_float_equality_is_parity_based() {
        let asm = compile("int main(void) { double d; d = 1.0; return d == 1.0; }");

        assert!(asm.contains("\tucomisd\t%xmm0, %xmm1"));
        assert!(asm.contains("\tsetnp\t%al"));
    }

    #[test]
    fn test_int_to_double_conversion_is_scalar() {
        let asm = compile("int main(void) { double d; d = 1; return 0; }");
        assert!(asm.contains("\tcvtsi2sdl\t%eax, %xmm0"));
    }

    #[test]
    fn test_array_init_zero_fills_the_tail() {
        let asm = compile("int main(void) { int a[4] = {1, 2}; return 0; }");

        assert!(asm.contains("\tmovl\t$1, %eax"));
        // two trailing elements zeroed directly in memory
        let zero_stores = asm
            .lines()
            .filter(|l| l.starts_with("\tmovl\t$0, -") && l.ends_with("(%rbp)"))
            .count();
        assert_eq!(zero_stores, 2);
    }

    #[test]
    fn test_array_reference_decays_via_lea() {
        let asm = compile("int main(void) { int a[4] = {0}; int *p; p = a; return 0; }");
        assert!(asm.contains("\tleaq\t-16(%rbp), %rax"));
    }

    #[test]
    fn test_argument_registers_in_order() {
        let asm = compile(
            "int f(int a, int b, int c) { return a + b + c; }\n\
             int main(void) { return f(1, 2, 3); }",
        );

        // prologue spills
        assert!(asm.contains("\tmovl\t%edi, -4(%rbp)"));
        assert!(asm.contains("\tmovl\t%esi, -8(%rbp)"));
        assert!(asm.contains("\tmovl\t%edx, -12(%rbp)"));
        // call site pops into the argument registers in order
        let call_pos = asm.find("\tcall\tf").expect("missing call");
        let before = &asm[..call_pos];
        let rdi = before.rfind("\tpopq\t%rdi").expect("missing rdi pop");
        let rsi = before.rfind("\tpopq\t%rsi").expect("missing rsi pop");
        let rdx = before.rfind("\tpopq\t%rdx").expect("missing rdx pop");
        assert!(rdi < rsi && rsi < rdx);
    }

    #[test]
    fn test_mixed_float_arguments_use_xmm_registers() {
        let asm = compile(
            "double f(int a, double b) { return b; }\n\
             int main(void) { double d; d = f(1, 2.0); return 0; }",
        );

        assert!(asm.contains("\tmovsd\t%xmm0, -16(%rbp)"));
        let call_pos = asm.find("\tcall\tf").expect("missing call");
        assert!(asm[..call_pos].contains("\tmovsd\t(%rsp), %xmm0"));
    }

    #[test]
    fn test_prototype_emits_no_code() {
        let asm = compile("int f(int x);\nint main(void) { return 0; }");
        assert!(!asm.contains("f:"));
    }

    #[test]
    fn test_label_counters_reset_per_compiler() {
        let first = compile("int main(void) { if (1) return 1; return 0; }");
        let second = compile("int main(void) { if (1) return 1; return 0; }");
        assert_eq!(first, second);
    }

    #[test]
    fn test_escape_for_string_directive() {
        assert_eq!(escape("a\nb"), "a\\nb");
        assert_eq!(escape("quote\"back\\slash"), "quote\\\"back\\\\slash");
        assert_eq!(escape("tab\there"), "tab\\there");
    }
}
