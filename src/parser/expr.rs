//! Expression parsing: the C precedence hierarchy, each level lowering to
//! the next, with the typing rules applied as nodes are built.

use crate::lexer::{Punct, Token};

use super::{
    ast::*,
    ctype::{arith_conv, CType, FuncSig},
    Parser, Symbol, TResult,
};

/// Wrap `expr` in an arithmetic conversion unless it already has the type.
pub(crate) fn conv(ctype: CType, expr: Expression) -> Expression {
    if expr.ctype().compatible(&ctype) {
        return expr;
    }
    Expression::ArithConv(Box::new(ArithConv { expr, ctype }))
}

/// Map an assignment operator onto the binary operator it compounds, or
/// `None` for plain `=`.
fn assign_op(punct: Punct) -> Option<Option<BinaryOp>> {
    match punct {
        Punct::Assign => Some(None),
        Punct::MulAssign => Some(Some(BinaryOp::Mul)),
        Punct::DivAssign => Some(Some(BinaryOp::Div)),
        Punct::ModAssign => Some(Some(BinaryOp::Mod)),
        Punct::AddAssign => Some(Some(BinaryOp::Add)),
        Punct::SubAssign => Some(Some(BinaryOp::Sub)),
        Punct::ShlAssign => Some(Some(BinaryOp::Shl)),
        Punct::ShrAssign => Some(Some(BinaryOp::Shr)),
        Punct::AndAssign => Some(Some(BinaryOp::BitAnd)),
        Punct::XorAssign => Some(Some(BinaryOp::BitXor)),
        Punct::OrAssign => Some(Some(BinaryOp::BitOr)),
        _ => None,
    }
}

fn binary(op: BinaryOp, ctype: CType, lhs: Expression, rhs: Expression) -> Expression {
    Expression::Binary(Box::new(BinaryExpr { op, lhs, rhs, ctype }))
}

impl Parser {
    /// expression: assignment-expression ( , assignment-expression )*
    pub(crate) fn parse_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_assign_expr()?;
        while self.try_punct(Punct::Comma)? {
            let rhs = self.parse_assign_expr()?;
            let ctype = rhs.ctype().clone();
            node = binary(BinaryOp::Comma, ctype, node, rhs);
        }
        Ok(node)
    }

    /// assignment-expression: conditional-expression
    ///                      | unary-expression assignment-operator assignment-expression
    pub(crate) fn parse_assign_expr(&mut self) -> TResult<Expression> {
        let node = self.parse_cond_expr()?;
        if matches!(node, Expression::Binary(_) | Expression::Ternary(_)) {
            return Ok(node);
        }
        let Some(token) = self.try_next()? else {
            return Ok(node);
        };
        let Token::Punct { punct, position } = token else {
            self.unget(token);
            return Ok(node);
        };
        let Some(op) = assign_op(punct) else {
            self.unget(Token::Punct { punct, position });
            return Ok(node);
        };

        if !node.is_lvalue() {
            return Err(self.err_at(position, "lvalue required as left operand of assignment"));
        }

        let mut rhs = self.parse_assign_expr()?;

        // compound assignment lowers to `lhs = lhs op rhs`
        if let Some(op) = op {
            let lhs_type = node.ctype().clone();
            let rhs_type = rhs.ctype().clone();
            let invalid = format!(
                "invalid operands to binary {punct} (have '{lhs_type}' and '{rhs_type}')"
            );
            if lhs_type.is_ptr() {
                rhs = match op {
                    BinaryOp::Add if rhs_type == CType::Int => {
                        binary(BinaryOp::Add, lhs_type.clone(), node.clone(), rhs)
                    }
                    BinaryOp::Sub if rhs_type == CType::Int => {
                        binary(BinaryOp::Sub, lhs_type.clone(), node.clone(), rhs)
                    }
                    BinaryOp::Sub if lhs_type.compatible(&rhs_type) => {
                        binary(BinaryOp::Sub, CType::Int, node.clone(), rhs)
                    }
                    _ => return Err(self.err_at(position, invalid)),
                };
            } else if matches!(
                op,
                BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
            ) {
                if !lhs_type.is_arith() || !rhs_type.is_arith() {
                    return Err(self.err_at(position, invalid));
                }
                if op == BinaryOp::Div && rhs.is_zero() {
                    return Err(self.err_at(position, "division by zero"));
                }
                let converted = conv(lhs_type.clone(), rhs);
                rhs = binary(op, lhs_type.clone(), node.clone(), converted);
            } else {
                // %= &= ^= |= <<= >>=
                if lhs_type != CType::Int || rhs_type != CType::Int {
                    return Err(self.err_at(position, invalid));
                }
                if op == BinaryOp::Mod && rhs.is_zero() {
                    return Err(self.err_at(position, "division by zero"));
                }
                rhs = binary(op, lhs_type.clone(), node.clone(), rhs);
            }
        }

        let lhs_type = node.ctype().clone();
        if lhs_type.is_arith() && rhs.ctype().is_arith() {
            rhs = conv(lhs_type.clone(), rhs);
        } else if !(rhs.ctype().compatible(&lhs_type) || (lhs_type.is_ptr() && rhs.is_null())) {
            return Err(self.err_at(
                position,
                format!(
                    "assignment makes {} from {} without a cast",
                    lhs_type,
                    rhs.ctype()
                ),
            ));
        }
        Ok(Expression::Assignment(Box::new(Assignment {
            lhs: node,
            rhs,
            ctype: lhs_type,
        })))
    }

    /// conditional-expression: logical-OR ( ? expression : conditional )?
    fn parse_cond_expr(&mut self) -> TResult<Expression> {
        let cond = self.parse_log_or_expr()?;
        if !self.try_punct(Punct::Question)? {
            return Ok(cond);
        }
        self.check_scalar(&cond)?;
        let then_expr = self.parse_expr()?;
        self.expect_punct(Punct::Colon)?;
        let else_expr = self.parse_cond_expr()?;

        if then_expr.ctype().is_arith() && else_expr.ctype().is_arith() {
            let ctype = arith_conv(then_expr.ctype(), else_expr.ctype());
            return Ok(Expression::Ternary(Box::new(Ternary {
                cond,
                then_expr: conv(ctype.clone(), then_expr),
                else_expr: conv(ctype.clone(), else_expr),
                ctype,
            })));
        }
        if !then_expr.ctype().compatible(else_expr.ctype())
            && !then_expr.is_null()
            && !else_expr.is_null()
        {
            return Err(self.err_here("type mismatch in conditional expression"));
        }
        let ctype = then_expr.ctype().clone();
        Ok(Expression::Ternary(Box::new(Ternary {
            cond,
            then_expr,
            else_expr,
            ctype,
        })))
    }

    fn parse_log_or_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_log_and_expr()?;
        while self.try_punct(Punct::LogOr)? {
            let rhs = self.parse_log_and_expr()?;
            self.check_scalar(&node)?;
            self.check_scalar(&rhs)?;
            node = binary(BinaryOp::LogOr, CType::Int, node, rhs);
        }
        Ok(node)
    }

    fn parse_log_and_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_bit_or_expr()?;
        while self.try_punct(Punct::LogAnd)? {
            let rhs = self.parse_bit_or_expr()?;
            self.check_scalar(&node)?;
            self.check_scalar(&rhs)?;
            node = binary(BinaryOp::LogAnd, CType::Int, node, rhs);
        }
        Ok(node)
    }

    fn check_int_operands(
        &self,
        op: BinaryOp,
        lhs: &Expression,
        rhs: &Expression,
    ) -> TResult<()> {
        if *lhs.ctype() != CType::Int || *rhs.ctype() != CType::Int {
            return Err(self.err_here(format!(
                "invalid operands to binary {op} (have '{}' and '{}')",
                lhs.ctype(),
                rhs.ctype()
            )));
        }
        Ok(())
    }

    fn parse_bit_or_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_bit_xor_expr()?;
        while self.try_punct(Punct::Pipe)? {
            let rhs = self.parse_bit_xor_expr()?;
            self.check_int_operands(BinaryOp::BitOr, &node, &rhs)?;
            node = binary(BinaryOp::BitOr, CType::Int, node, rhs);
        }
        Ok(node)
    }

    fn parse_bit_xor_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_bit_and_expr()?;
        while self.try_punct(Punct::Caret)? {
            let rhs = self.parse_bit_and_expr()?;
            self.check_int_operands(BinaryOp::BitXor, &node, &rhs)?;
            node = binary(BinaryOp::BitXor, CType::Int, node, rhs);
        }
        Ok(node)
    }

    fn parse_bit_and_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_equality_expr()?;
        while self.try_punct(Punct::Amp)? {
            let rhs = self.parse_equality_expr()?;
            self.check_int_operands(BinaryOp::BitAnd, &node, &rhs)?;
            node = binary(BinaryOp::BitAnd, CType::Int, node, rhs);
        }
        Ok(node)
    }

    /// Shared typing for the relational and equality levels.
    fn check_comparison(&self, lhs: &Expression, rhs: &Expression) -> TResult<()> {
        if lhs.ctype().is_ptr() && rhs.ctype().is_ptr() {
            if !lhs.ctype().compatible(rhs.ctype()) {
                return Err(self.err_here("comparison of distinct pointer types lacks a cast"));
            }
        } else if !((lhs.ctype().is_arith() && rhs.ctype().is_arith())
            || (lhs.ctype().is_ptr() && rhs.is_null())
            || (rhs.ctype().is_ptr() && lhs.is_null()))
        {
            return Err(self.err_here(format!(
                "comparison between {} and {}",
                lhs.ctype(),
                rhs.ctype()
            )));
        }
        Ok(())
    }

    fn parse_equality_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_relational_expr()?;
        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let op = if token.is_punct(Punct::Eq) {
                BinaryOp::Eq
            } else if token.is_punct(Punct::Ne) {
                BinaryOp::Ne
            } else {
                self.unget(token);
                return Ok(node);
            };

            let mut rhs = self.parse_relational_expr()?;
            self.check_comparison(&node, &rhs)?;
            if node.ctype().is_arith() && rhs.ctype().is_arith() {
                let ctype = arith_conv(node.ctype(), rhs.ctype());
                node = conv(ctype.clone(), node);
                rhs = conv(ctype, rhs);
            }
            node = binary(op, CType::Int, node, rhs);
        }
    }

    fn parse_relational_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_shift_expr()?;
        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let op = if token.is_punct(Punct::Lt) {
                BinaryOp::Lt
            } else if token.is_punct(Punct::Gt) {
                BinaryOp::Gt
            } else if token.is_punct(Punct::Le) {
                BinaryOp::Le
            } else if token.is_punct(Punct::Ge) {
                BinaryOp::Ge
            } else {
                self.unget(token);
                return Ok(node);
            };

            let mut rhs = self.parse_shift_expr()?;
            self.check_comparison(&node, &rhs)?;
            if node.ctype().is_arith() && rhs.ctype().is_arith() {
                let ctype = arith_conv(node.ctype(), rhs.ctype());
                node = conv(ctype.clone(), node);
                rhs = conv(ctype, rhs);
            }
            node = binary(op, CType::Int, node, rhs);
        }
    }

    fn parse_shift_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_additive_expr()?;
        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let op = if token.is_punct(Punct::Shl) {
                BinaryOp::Shl
            } else if token.is_punct(Punct::Shr) {
                BinaryOp::Shr
            } else {
                self.unget(token);
                return Ok(node);
            };

            let rhs = self.parse_additive_expr()?;
            self.check_int_operands(op, &node, &rhs)?;
            node = binary(op, CType::Int, node, rhs);
        }
    }

    fn parse_additive_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_multiplicative_expr()?;
        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let op = if token.is_punct(Punct::Plus) {
                BinaryOp::Add
            } else if token.is_punct(Punct::Minus) {
                BinaryOp::Sub
            } else {
                self.unget(token);
                return Ok(node);
            };

            let rhs = self.parse_multiplicative_expr()?;
            // pointer +- integer
            node = if node.ctype().is_ptr() && *rhs.ctype() == CType::Int {
                let ctype = node.ctype().clone();
                binary(op, ctype, node, rhs)
            // integer + pointer rewrites to pointer + integer
            } else if op == BinaryOp::Add
                && *node.ctype() == CType::Int
                && rhs.ctype().is_ptr()
            {
                let ctype = rhs.ctype().clone();
                binary(BinaryOp::Add, ctype, rhs, node)
            // pointer - pointer
            } else if op == BinaryOp::Sub
                && node.ctype().is_ptr()
                && node.ctype().compatible(rhs.ctype())
            {
                binary(BinaryOp::Sub, CType::Int, node, rhs)
            // number +- number
            } else if node.ctype().is_arith() && rhs.ctype().is_arith() {
                let ctype = arith_conv(node.ctype(), rhs.ctype());
                binary(op, ctype.clone(), conv(ctype.clone(), node), conv(ctype, rhs))
            } else {
                return Err(self.err_at(
                    token.position(),
                    format!(
                        "invalid operands to binary {op} (have '{}' and '{}')",
                        node.ctype(),
                        rhs.ctype()
                    ),
                ));
            };
        }
    }

    fn parse_multiplicative_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_cast_expr()?;
        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let op = if token.is_punct(Punct::Star) {
                BinaryOp::Mul
            } else if token.is_punct(Punct::Slash) {
                BinaryOp::Div
            } else if token.is_punct(Punct::Percent) {
                BinaryOp::Mod
            } else {
                self.unget(token);
                return Ok(node);
            };

            let rhs = self.parse_cast_expr()?;
            if !(node.ctype().is_arith() && rhs.ctype().is_arith())
                || (op == BinaryOp::Mod
                    && (*node.ctype() != CType::Int || *rhs.ctype() != CType::Int))
            {
                return Err(self.err_at(
                    token.position(),
                    format!(
                        "invalid operands to binary {op} (have '{}' and '{}')",
                        node.ctype(),
                        rhs.ctype()
                    ),
                ));
            }
            if matches!(op, BinaryOp::Div | BinaryOp::Mod) && rhs.is_zero() {
                return Err(self.err_at(token.position(), "division by zero"));
            }
            let ctype = arith_conv(node.ctype(), rhs.ctype());
            node = binary(op, ctype.clone(), conv(ctype.clone(), node), conv(ctype, rhs));
        }
    }

    fn parse_type_name(&mut self) -> TResult<CType> {
        let mut ctype = self.parse_decl_spec()?;
        while self.try_punct(Punct::Star)? {
            ctype = ctype.pointer_to();
        }
        Ok(ctype)
    }

    /// cast-expression: unary-expression | ( type-name ) cast-expression
    fn parse_cast_expr(&mut self) -> TResult<Expression> {
        if !matches!(self.peek()?, Some(t) if t.is_punct(Punct::LParen)) {
            return self.parse_unary_expr();
        }
        let lparen = self.next()?;
        if !matches!(self.peek()?, Some(t) if t.is_type()) {
            self.unget(lparen);
            return self.parse_unary_expr();
        }

        let position = lparen.position();
        let ctype = self.parse_type_name()?;
        self.expect_punct(Punct::RParen)?;
        if ctype == CType::Void {
            return Err(self.err_at(position, "void value not ignored as it ought to be"));
        }
        let expr = self.parse_cast_expr()?;
        if expr.ctype().is_ptr() && !ctype.is_ptr() {
            return Err(self.err_at(position, "cast from pointer to integer of different size"));
        }
        if ctype.is_ptr() && !expr.ctype().is_ptr() {
            return Err(self.err_at(position, "cast to pointer from integer of different size"));
        }
        Ok(Expression::Cast(Box::new(Cast { expr, ctype })))
    }

    /// unary-expression: postfix-expression | ++/-- unary | unary-op cast
    fn parse_unary_expr(&mut self) -> TResult<Expression> {
        let token = self.next()?;
        let Token::Punct { punct, position } = token else {
            self.unget(token);
            return self.parse_postfix_expr();
        };

        let unary = match punct {
            Punct::Inc | Punct::Dec => {
                let expr = self.parse_unary_expr()?;
                if !expr.is_lvalue() {
                    return Err(self.err_at(
                        position,
                        format!("lvalue required as unary '{punct}' operand"),
                    ));
                }
                if !expr.ctype().is_arith() && !expr.ctype().is_ptr() {
                    return Err(self.err_at(
                        position,
                        format!(
                            "invalid type argument of unary '{punct}' (have '{}')",
                            expr.ctype()
                        ),
                    ));
                }
                let op = if punct == Punct::Inc { UnaryOp::Inc } else { UnaryOp::Dec };
                let ctype = expr.ctype().clone();
                Unary { op, operand: expr, ctype }
            }
            Punct::Amp => {
                let expr = self.parse_cast_expr()?;
                if !expr.is_lvalue() {
                    return Err(self.err_at(position, "lvalue required as unary '&' operand"));
                }
                let ctype = expr.ctype().clone().pointer_to();
                Unary { op: UnaryOp::Addr, operand: expr, ctype }
            }
            Punct::Star => {
                let expr = self.parse_cast_expr()?;
                let Some(pointee) = expr.ctype().pointee().cloned() else {
                    return Err(self.err_at(
                        position,
                        format!("invalid type argument of unary '*' (have '{}')", expr.ctype()),
                    ));
                };
                if pointee == CType::Void {
                    return Err(self.err_at(position, "dereferencing 'void *' pointer"));
                }
                Unary { op: UnaryOp::Deref, operand: expr, ctype: pointee }
            }
            Punct::Plus | Punct::Minus => {
                let expr = self.parse_cast_expr()?;
                if !expr.ctype().is_arith() {
                    return Err(self.err_at(
                        position,
                        format!("wrong type argument to unary '{punct}'"),
                    ));
                }
                let op = if punct == Punct::Plus { UnaryOp::Plus } else { UnaryOp::Neg };
                let ctype = expr.ctype().clone();
                Unary { op, operand: expr, ctype }
            }
            Punct::Tilde => {
                let expr = self.parse_cast_expr()?;
                if *expr.ctype() != CType::Int {
                    return Err(self.err_at(position, "wrong type argument to bit-complement"));
                }
                Unary { op: UnaryOp::BitNot, operand: expr, ctype: CType::Int }
            }
            Punct::Not => {
                let expr = self.parse_cast_expr()?;
                self.check_scalar(&expr)?;
                Unary { op: UnaryOp::Not, operand: expr, ctype: CType::Int }
            }
            _ => {
                self.unget(Token::Punct { punct, position });
                return self.parse_postfix_expr();
            }
        };

        Ok(Expression::Unary(Box::new(unary)))
    }

    /// postfix-expression: primary, then `++`/`--` (calls are resolved while
    /// parsing the primary; indexing and member access are unsupported).
    fn parse_postfix_expr(&mut self) -> TResult<Expression> {
        let mut node = self.parse_primary_expr()?;

        loop {
            let Some(token) = self.try_next()? else {
                return Ok(node);
            };
            let Token::Punct { punct, position } = token else {
                self.unget(token);
                return Ok(node);
            };
            match punct {
                Punct::LBracket => {
                    return Err(self.err_at(position, "array indexing is not supported"));
                }
                Punct::Dot | Punct::Arrow => {
                    return Err(self.err_at(position, "member access is not supported"));
                }
                Punct::LParen => {
                    return Err(self.err_at(
                        position,
                        "called object is not a function or function pointer",
                    ));
                }
                Punct::Inc | Punct::Dec => {
                    if !node.is_lvalue() {
                        return Err(self.err_at(
                            position,
                            format!("lvalue required as unary '{punct}' operand"),
                        ));
                    }
                    if !node.ctype().is_arith() && !node.ctype().is_ptr() {
                        return Err(self.err_at(
                            position,
                            format!(
                                "invalid type argument of unary '{punct}' (have '{}')",
                                node.ctype()
                            ),
                        ));
                    }
                    let op = if punct == Punct::Inc { PostfixOp::Inc } else { PostfixOp::Dec };
                    let ctype = node.ctype().clone();
                    node = Expression::Postfix(Box::new(Postfix { op, operand: node, ctype }));
                }
                _ => {
                    self.unget(Token::Punct { punct, position });
                    return Ok(node);
                }
            }
        }
    }

    /// primary-expression: identifier, constant, string literal or parens.
    fn parse_primary_expr(&mut self) -> TResult<Expression> {
        if self.try_punct(Punct::LParen)? {
            let expr = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            return Ok(expr);
        }

        let token = self.next()?;
        match token {
            Token::Id { name, position } => match self.env.lookup(&name).cloned() {
                Some(Symbol::Var { ctype }) => Ok(Expression::Id(Id { name, ctype })),
                Some(Symbol::Func(sig)) => {
                    if !self.try_punct(Punct::LParen)? {
                        return Err(self.err_at(position, format!("expected '(' after '{name}'")));
                    }
                    self.parse_arg_expr_list(name, sig, position)
                }
                None => Err(self.err_at(position, format!("'{name}' undeclared"))),
            },
            Token::Number { text, position } => self.make_number(&text, position),
            Token::CharLit { value, .. } => Ok(Expression::Constant(Constant::Int {
                value: value as i64,
                ctype: CType::Char,
            })),
            Token::Str { value, .. } => Ok(Expression::Str(Str {
                value,
                ctype: CType::Char.pointer_to(),
            })),
            token => Err(self.err_at(token.position(), "expected expression")),
        }
    }

    /// Type a numeric literal: `f`/`F` suffix or a fractional/exponent part
    /// makes it floating, otherwise it is an int.
    fn make_number(&self, text: &str, position: (usize, usize)) -> TResult<Expression> {
        let constant = if text.contains(|c| matches!(c, '.' | 'e' | 'E')) {
            if let Some(stripped) = text.strip_suffix(|c| matches!(c, 'f' | 'F')) {
                let value = stripped
                    .parse::<f64>()
                    .map_err(|_| self.err_at(position, format!("invalid number '{text}'")))?;
                Constant::Float { value, ctype: CType::Float }
            } else {
                let value = text
                    .parse::<f64>()
                    .map_err(|_| self.err_at(position, format!("invalid number '{text}'")))?;
                Constant::Float { value, ctype: CType::Double }
            }
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| self.err_at(position, format!("invalid integer constant '{text}'")))?;
            Constant::Int { value, ctype: CType::Int }
        };
        Ok(Expression::Constant(constant))
    }

    /// argument-expression-list, checked against the callee's signature.
    fn parse_arg_expr_list(
        &mut self,
        name: String,
        sig: FuncSig,
        position: (usize, usize),
    ) -> TResult<Expression> {
        let mut args = vec![];

        if sig.params.is_empty() {
            if !self.try_punct(Punct::RParen)? {
                return Err(
                    self.err_at(position, format!("too many arguments to function '{name}'"))
                );
            }
            return Ok(Expression::Call(Call {
                name,
                args,
                variadic: sig.variadic,
                ctype: sig.ret,
            }));
        }

        if self.try_punct(Punct::RParen)? {
            return Err(self.err_at(position, format!("too few arguments to function '{name}'")));
        }

        let mut i = 0;
        loop {
            self.check_arg_follows()?;
            let arg = self.parse_assign_expr()?;
            if !arg.ctype().compatible(&sig.params[i]) {
                return Err(self.err_at(
                    position,
                    format!(
                        "passing argument {} of '{name}' makes {} from {} without a cast",
                        i + 1,
                        sig.params[i],
                        arg.ctype()
                    ),
                ));
            }
            args.push(arg);
            if i == sig.params.len() - 1
                || matches!(self.peek()?, Some(t) if t.is_punct(Punct::RParen))
            {
                break;
            }
            if !self.try_punct(Punct::Comma)? {
                break;
            }
            i += 1;
        }

        if sig.variadic && self.try_punct(Punct::Comma)? {
            loop {
                self.check_arg_follows()?;
                args.push(self.parse_assign_expr()?);
                if matches!(self.peek()?, Some(t) if t.is_punct(Punct::RParen)) {
                    break;
                }
                if !self.try_punct(Punct::Comma)? {
                    break;
                }
            }
        }

        if i < sig.params.len() - 1 {
            return Err(self.err_at(position, format!("too few arguments to function '{name}'")));
        } else if self.try_punct(Punct::Comma)? {
            return Err(self.err_at(position, format!("too many arguments to function '{name}'")));
        }
        self.expect_punct(Punct::RParen)?;

        let int_args = args.iter().filter(|a| !a.ctype().is_float()).count();
        let float_args = args.iter().filter(|a| a.ctype().is_float()).count();
        if int_args > 6 {
            return Err(self.err_at(
                position,
                format!("more than 6 integer arguments to '{name}' are not supported"),
            ));
        }
        if float_args > 8 {
            return Err(self.err_at(
                position,
                format!("more than 8 floating-point arguments to '{name}' are not supported"),
            ));
        }

        Ok(Expression::Call(Call {
            name,
            args,
            variadic: sig.variadic,
            ctype: sig.ret,
        }))
    }

    fn check_arg_follows(&mut self) -> TResult<()> {
        if let Some(token) = self.peek()? {
            if token.is_punct(Punct::Comma)
                || token.is_punct(Punct::RParen)
                || token.is_punct(Punct::Semicolon)
            {
                return Err(self.err_at(
                    token.position(),
                    format!("expected expression before '{token}' token"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::parse_program;
    use super::*;
    use crate::parser::ast::Statement;

    /// Parse statements inside a main that declares `int x; int *p; double d;`.
    fn parse_stmts(stmts: &str) -> crate::parser::TResult<Vec<Statement>> {
        let src = format!("int main(void) {{ int x; int *p; double d; {stmts} return 0; }}");
        parse_program(&src).map(|ast| {
            ast.nodes()[0]
                .body
                .as_ref()
                .unwrap()
                .statements
                .clone()
        })
    }

    fn stmt(stmts: &str) -> Statement {
        parse_stmts(stmts).expect("parse failed")[3].clone()
    }

    fn stmt_err(stmts: &str) -> String {
        parse_stmts(stmts).unwrap_err().message
    }

    #[test]
    fn test_type_monotonicity() {
        let Statement::Expression(Expression::Binary(add)) = stmt("1 + 2.5;") else {
            panic!("expected binary expression statement");
        };
        assert_eq!(add.ctype, CType::Double);
        assert!(matches!(&add.lhs, Expression::ArithConv(conv) if conv.ctype == CType::Double));
        assert!(matches!(&add.rhs, Expression::Constant(Constant::Float { .. })));
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let Statement::Expression(Expression::Binary(add)) = stmt("1 + 2 * 3;") else {
            panic!("expected binary expression statement");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(&add.rhs, Expression::Binary(mul) if mul.op == BinaryOp::Mul));
    }

    #[test]
    fn test_pointer_plus_int() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("p = p + 1;") else {
            panic!("expected assignment");
        };
        let Expression::Binary(add) = &assign.rhs else {
            panic!("expected binary rhs");
        };
        assert_eq!(add.ctype, CType::Int.pointer_to());
        assert!(matches!(&add.lhs, Expression::Id(id) if id.name == "p"));
    }

    #[test]
    fn test_int_plus_pointer_is_normalised() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("p = 1 + p;") else {
            panic!("expected assignment");
        };
        let Expression::Binary(add) = &assign.rhs else {
            panic!("expected binary rhs");
        };
        // the pointer ends up on the left
        assert!(matches!(&add.lhs, Expression::Id(id) if id.name == "p"));
        assert!(matches!(&add.rhs, Expression::Constant(_)));
    }

    #[test]
    fn test_pointer_minus_pointer_is_int() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("x = p - p;") else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.rhs, Expression::Binary(sub) if sub.ctype == CType::Int));
    }

    #[test]
    fn test_pointer_times_int_is_invalid() {
        assert!(stmt_err("p = p * 2;").contains("invalid operands to binary *"));
    }

    #[test]
    fn test_compound_assignment_lowering() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("x += 2;") else {
            panic!("expected assignment");
        };
        let Expression::Binary(add) = &assign.rhs else {
            panic!("expected lowered binary rhs");
        };
        assert_eq!(add.op, BinaryOp::Add);
        assert!(matches!(&add.lhs, Expression::Id(id) if id.name == "x"));
    }

    #[test]
    fn test_division_by_literal_zero() {
        assert!(stmt_err("x = x / 0;").contains("division by zero"));
        assert!(stmt_err("x %= 0;").contains("division by zero"));
    }

    #[test]
    fn test_assignment_to_rvalue() {
        assert!(stmt_err("1 = 2;").contains("lvalue required"));
    }

    #[test]
    fn test_assignment_conversion() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("x = 1.5;") else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.rhs, Expression::ArithConv(conv) if conv.ctype == CType::Int));
    }

    #[test]
    fn test_pointer_gets_null() {
        assert!(parse_stmts("p = 0;").is_ok());
        assert!(stmt_err("p = 1;").contains("assignment makes pointer from int"));
    }

    #[test]
    fn test_pointer_int_comparison() {
        let message = stmt_err("if (p < x) ;");
        assert!(message.contains("comparison between pointer and int"));
    }

    #[test]
    fn test_pointer_null_comparison_is_fine() {
        assert!(parse_stmts("if (p == 0) ;").is_ok());
        assert!(parse_stmts("if (0 != p) ;").is_ok());
    }

    #[test]
    fn test_too_few_arguments() {
        assert!(stmt_err("printf();").contains("too few arguments"));
    }

    #[test]
    fn test_too_many_arguments() {
        assert!(stmt_err("puts(\"a\", \"b\");").contains("too many arguments"));
    }

    #[test]
    fn test_argument_type_mismatch() {
        assert!(stmt_err("puts(1);").contains("passing argument 1 of 'puts'"));
    }

    #[test]
    fn test_variadic_extra_arguments() {
        assert!(parse_stmts("printf(\"%d %f\\n\", x, d);").is_ok());
    }

    #[test]
    fn test_ternary_mismatch() {
        assert!(stmt_err("x = x ? p : 1.5;").contains("type mismatch in conditional expression"));
    }

    #[test]
    fn test_ternary_common_type() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("d = x ? 1 : 2.0;")
        else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.rhs, Expression::Ternary(t) if t.ctype == CType::Double));
    }

    #[test]
    fn test_bitwise_needs_int() {
        assert!(stmt_err("x = x & 1.5;").contains("invalid operands to binary &"));
        assert!(stmt_err("d = d << 1;").contains("invalid operands to binary <<"));
    }

    #[test]
    fn test_modulo_needs_int() {
        assert!(stmt_err("d = d % 2;").contains("invalid operands to binary %"));
    }

    #[test]
    fn test_bit_complement_needs_int() {
        assert!(stmt_err("d = ~d;").contains("wrong type argument to bit-complement"));
    }

    #[test]
    fn test_deref_of_non_pointer() {
        assert!(stmt_err("x = *x;").contains("invalid type argument of unary '*'"));
    }

    #[test]
    fn test_address_of_rvalue() {
        assert!(stmt_err("p = &1;").contains("lvalue required as unary '&'"));
    }

    #[test]
    fn test_deref_assignment() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("*p = 3;") else {
            panic!("expected assignment");
        };
        assert!(assign.lhs.is_lvalue());
        assert_eq!(assign.ctype, CType::Int);
    }

    #[test]
    fn test_undeclared_identifier() {
        assert!(stmt_err("y = 1;").contains("'y' undeclared"));
    }

    #[test]
    fn test_call_of_non_function() {
        assert!(stmt_err("x = x();").contains("called object is not a function"));
    }

    #[test]
    fn test_increment_needs_lvalue() {
        assert!(stmt_err("x = (x + 1)++;").contains("lvalue required as unary '++'"));
    }

    #[test]
    fn test_explicit_cast() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("d = (double)x;")
        else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.rhs, Expression::Cast(cast) if cast.ctype == CType::Double));
    }

    #[test]
    fn test_cast_pointer_to_int_rejected() {
        assert!(stmt_err("x = (int)p;").contains("cast from pointer"));
        assert!(stmt_err("p = (int *)x;").contains("cast to pointer"));
    }

    #[test]
    fn test_cast_of_void_rejected() {
        assert!(stmt_err("x = (void)x;").contains("void value not ignored"));
    }

    #[test]
    fn test_comma_expression() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("x = (x = 1, 2);")
        else {
            panic!("expected assignment");
        };
        assert!(matches!(&assign.rhs, Expression::Binary(b) if b.op == BinaryOp::Comma));
    }

    #[test]
    fn test_char_is_not_arithmetic() {
        // char is storage-only in this subset; comparisons reject it
        let src = "int main(void) { char c; if (c == 'a') ; return 0; }";
        let message = parse_program(src).unwrap_err().message;
        assert!(message.contains("comparison between character and character"));
    }

    #[test]
    fn test_logical_short_circuit_types() {
        let Statement::Expression(Expression::Assignment(assign)) = stmt("x = x && p || 0;")
        else {
            panic!("expected assignment");
        };
        assert_eq!(assign.ctype, CType::Int);
    }
}
