//! Parser and semantic analyzer for the C subset.
//!
//! A hand-written recursive-descent parser that follows the C expression
//! precedence hierarchy and performs type checking while it builds the AST:
//! every expression node comes out of here with its resolved [`CType`]
//! attached, and the usual arithmetic conversions are inserted as explicit
//! [`ast::ArithConv`] nodes. All diagnostics are fatal.
pub mod ast;
pub mod ctype;
mod env;
mod expr;

pub use self::env::{setup_env, Env, Symbol};

use std::{error::Error, fmt::Display};

use crate::lexer::{Keyword, LexError, Lexer, Position, Punct, Token};

use self::{
    ast::*,
    ctype::{CType, FuncSig},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: (String, usize, usize),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (file, line, col) = &self.position;
        write!(f, "{} ({}:{}:{})", self.message, file, line, col)
    }
}

impl Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(error: LexError) -> Self {
        ParseError {
            message: error.message,
            position: error.position,
        }
    }
}

pub(crate) type TResult<T> = Result<T, ParseError>;

/// The outcome of parsing one declarator.
enum Declared {
    Var { name: String, ctype: CType },
    Func { name: String, ret: CType, params: Vec<Param> },
}

pub struct Parser {
    lexer: Lexer,
    env: Env,
    /// Return type of the function currently being parsed.
    ret: Option<CType>,
    /// Names of the functions that already have a body.
    defined: std::collections::HashSet<String>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            env: setup_env(),
            ret: None,
            defined: std::collections::HashSet::new(),
        }
    }

    /// Parse a whole translation unit.
    pub fn parse(mut self) -> TResult<Ast> {
        let mut nodes = vec![];

        while self.lexer.peek()?.is_some() {
            nodes.push(self.parse_func()?);
        }

        Ok(Ast::from_nodes(nodes))
    }

    /* token plumbing */

    pub(crate) fn err_at(&self, (line, col): Position, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: (self.lexer.fname().to_owned(), line, col),
        }
    }

    pub(crate) fn err_here(&self, message: impl Into<String>) -> ParseError {
        self.err_at((self.lexer.line(), self.lexer.column()), message)
    }

    pub(crate) fn next(&mut self) -> TResult<Token> {
        self.lexer
            .next()?
            .ok_or_else(|| self.err_here("unexpected end of input"))
    }

    pub(crate) fn try_next(&mut self) -> TResult<Option<Token>> {
        Ok(self.lexer.next()?)
    }

    pub(crate) fn peek(&mut self) -> TResult<Option<Token>> {
        Ok(self.lexer.peek()?)
    }

    pub(crate) fn unget(&mut self, token: Token) {
        self.lexer.unget(token);
    }

    pub(crate) fn expect_punct(&mut self, punct: Punct) -> TResult<()> {
        let token = self.next()?;
        if !token.is_punct(punct) {
            return Err(self.err_at(token.position(), format!("expected '{punct}'")));
        }
        Ok(())
    }

    pub(crate) fn try_punct(&mut self, punct: Punct) -> TResult<bool> {
        match self.peek()? {
            Some(token) if token.is_punct(punct) => {
                self.next()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn expect_kw(&mut self, keyword: Keyword) -> TResult<()> {
        let token = self.next()?;
        if !token.is_keyword(keyword) {
            return Err(self.err_at(token.position(), format!("expected keyword '{keyword}'")));
        }
        Ok(())
    }

    fn try_kw(&mut self, keyword: Keyword) -> TResult<bool> {
        match self.peek()? {
            Some(token) if token.is_keyword(keyword) => {
                self.next()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /* declarations */

    /// declaration-specifiers: one of the five type keywords.
    pub(crate) fn parse_decl_spec(&mut self) -> TResult<CType> {
        let token = self.next()?;
        let Token::Keyword { keyword, .. } = token else {
            return Err(self.err_at(token.position(), "expected type specifiers"));
        };
        match keyword {
            Keyword::Void => Ok(CType::Void),
            Keyword::Char => Ok(CType::Char),
            Keyword::Int => Ok(CType::Int),
            Keyword::Float => Ok(CType::Float),
            Keyword::Double => Ok(CType::Double),
            _ => Err(self.err_at(token.position(), "expected type specifiers")),
        }
    }

    /// declarator: pointer-opt direct-declarator
    fn parse_declarator(&mut self, mut ctype: CType) -> TResult<Declared> {
        while self.try_punct(Punct::Star)? {
            ctype = ctype.pointer_to();
        }
        self.parse_direct_decl(ctype)
    }

    /// direct-declarator: an identifier, `( declarator )`, a function
    /// prototype `name ( parameter-list )`, or an array `name [ length ]`.
    fn parse_direct_decl(&mut self, ctype: CType) -> TResult<Declared> {
        if self.try_punct(Punct::LParen)? {
            let decl = self.parse_declarator(ctype)?;
            self.expect_punct(Punct::RParen)?;
            return Ok(decl);
        }

        let token = self.next()?;
        let Token::Id { name, position } = token else {
            return Err(self.err_at(token.position(), "expected identifier"));
        };

        if self.try_punct(Punct::LParen)? {
            let params = self.parse_param_list()?;
            self.expect_punct(Punct::RParen)?;
            return Ok(Declared::Func {
                name,
                ret: ctype,
                params,
            });
        }

        if self.try_punct(Punct::LBracket)? {
            let token = self.next()?;
            let Token::Number { ref text, .. } = token else {
                return Err(self.err_at(token.position(), "expected array length"));
            };
            let len: usize = text
                .parse()
                .map_err(|_| self.err_at(token.position(), "expected integral array length"))?;
            self.expect_punct(Punct::RBracket)?;
            if ctype == CType::Void {
                return Err(self.err_at(position, format!("array '{name}' declared void")));
            }
            return Ok(Declared::Var {
                name,
                ctype: CType::Array(Box::new(ctype), len),
            });
        }

        if ctype == CType::Void {
            return Err(self.err_at(position, format!("variable '{name}' declared void")));
        }
        Ok(Declared::Var { name, ctype })
    }

    /// parameter-list: `void` or a comma-separated list of named parameters.
    fn parse_param_list(&mut self) -> TResult<Vec<Param>> {
        let token = self.next()?;
        if token.is_keyword(Keyword::Void)
            && matches!(self.peek()?, Some(t) if t.is_punct(Punct::RParen))
        {
            return Ok(vec![]);
        }
        self.unget(token);

        let mut params = vec![];
        loop {
            let base = self.parse_decl_spec()?;
            match self.parse_declarator(base)? {
                Declared::Var { name, ctype } => params.push(Param { name, ctype }),
                Declared::Func { name, .. } => {
                    return Err(
                        self.err_here(format!("parameter '{name}' declared as a function"))
                    );
                }
            }
            if !self.try_punct(Punct::Comma)? {
                break;
            }
        }
        Ok(params)
    }

    /// init-declarator: declarator, optionally `= initializer`.
    fn parse_init_decl(&mut self, base: CType) -> TResult<Declarator> {
        let decl = self.parse_declarator(base)?;
        let (name, ctype) = match decl {
            Declared::Var { name, ctype } => (name, ctype),
            Declared::Func { name, .. } => {
                return Err(self.err_here(format!(
                    "function '{name}' declared inside a block is not supported"
                )));
            }
        };

        if self.env.contains_in_current_scope(&name) {
            return Err(self.err_here(format!("redeclaration of '{name}'")));
        }
        self.env.insert(
            &name,
            Symbol::Var {
                ctype: ctype.clone(),
            },
        );

        if !self.try_punct(Punct::Assign)? {
            return Ok(Declarator {
                name,
                ctype,
                init: None,
            });
        }

        let init = if matches!(self.peek()?, Some(t) if t.is_punct(Punct::LBrace)) {
            Initializer::List(self.parse_initializer_list(&name, &ctype)?)
        } else {
            let init = self.parse_assign_expr()?;
            if matches!(ctype, CType::Array(_, _)) {
                return Err(self.err_here(format!("invalid initializer for array '{name}'")));
            }
            Initializer::Scalar(self.check_init(&ctype, init)?)
        };

        Ok(Declarator {
            name,
            ctype,
            init: Some(init),
        })
    }

    /// `{ assignment-expression , ... }` after an array declarator.
    fn parse_initializer_list(&mut self, name: &str, ctype: &CType) -> TResult<Vec<Expression>> {
        let CType::Array(elem, len) = ctype else {
            return Err(self.err_here(format!("invalid initializer for '{name}'")));
        };

        self.expect_punct(Punct::LBrace)?;
        let mut inits = vec![];
        if !self.try_punct(Punct::RBrace)? {
            loop {
                let init = self.parse_assign_expr()?;
                inits.push(self.check_init(elem, init)?);
                if !self.try_punct(Punct::Comma)? {
                    break;
                }
                // allow a trailing comma before the closing brace
                if matches!(self.peek()?, Some(t) if t.is_punct(Punct::RBrace)) {
                    break;
                }
            }
            self.expect_punct(Punct::RBrace)?;
        }

        if inits.len() > *len {
            return Err(self.err_here(format!("excess elements in array initializer of '{name}'")));
        }
        Ok(inits)
    }

    /// Type-check one initializer expression against the declared type.
    fn check_init(&self, ctype: &CType, init: Expression) -> TResult<Expression> {
        if ctype.is_arith() && init.ctype().is_arith() {
            return Ok(expr::conv(ctype.clone(), init));
        }
        if !(init.ctype().compatible(ctype) || (ctype.is_ptr() && init.is_null())) {
            return Err(self.err_here(format!(
                "initialization makes {} from {} without a cast",
                ctype,
                init.ctype()
            )));
        }
        Ok(init)
    }

    /// declaration: declaration-specifiers init-declarator-list ;
    fn parse_decl(&mut self) -> TResult<Statement> {
        let base = self.parse_decl_spec()?;
        let mut declarators = vec![self.parse_init_decl(base.clone())?];
        while self.try_punct(Punct::Comma)? {
            declarators.push(self.parse_init_decl(base.clone())?);
        }
        self.expect_punct(Punct::Semicolon)?;
        Ok(Statement::Declaration(Declaration { declarators }))
    }

    /* statements */

    fn parse_stmt(&mut self) -> TResult<Statement> {
        let token = self.next()?;

        match &token {
            Token::Punct { punct: Punct::LBrace, .. } => {
                self.env.push();
                let block = self.parse_compound_stmt()?;
                self.env.pop();
                return Ok(Statement::Compound(block));
            }
            Token::Punct { punct: Punct::Semicolon, .. } => return Ok(Statement::Empty),
            Token::Keyword { keyword, .. } => match keyword {
                Keyword::For => return self.parse_for_stmt(),
                Keyword::Do => return self.parse_do_while_stmt(),
                Keyword::While => return self.parse_while_stmt(),
                Keyword::If => return self.parse_if_stmt(),
                Keyword::Return => return self.parse_return_stmt(),
                _ => {}
            },
            _ => {}
        }

        self.unget(token);
        let expr = self.parse_expr()?;
        self.expect_punct(Punct::Semicolon)?;
        Ok(Statement::Expression(expr))
    }

    /// compound-statement body; the opening brace is already consumed and the
    /// caller manages the scope frame.
    fn parse_compound_stmt(&mut self) -> TResult<Block> {
        let mut statements = vec![];

        loop {
            if self.try_punct(Punct::RBrace)? {
                break;
            }
            let item = if matches!(self.peek()?, Some(t) if t.is_type()) {
                self.parse_decl()?
            } else {
                self.parse_stmt()?
            };
            statements.push(item);
        }

        Ok(Block { statements })
    }

    /// A value that is branched on or logically combined must not be void.
    pub(crate) fn check_scalar(&self, expr: &Expression) -> TResult<()> {
        if *expr.ctype() == CType::Void {
            return Err(self.err_here("void value not ignored as it ought to be"));
        }
        Ok(())
    }

    fn parse_cond_in_parens(&mut self) -> TResult<Expression> {
        self.expect_punct(Punct::LParen)?;
        if self.try_punct(Punct::RParen)? {
            return Err(self.err_here("expected expression before ')' token"));
        }
        let cond = self.parse_expr()?;
        self.check_scalar(&cond)?;
        self.expect_punct(Punct::RParen)?;
        Ok(cond)
    }

    fn parse_if_stmt(&mut self) -> TResult<Statement> {
        let cond = self.parse_cond_in_parens()?;
        let then_branch = self.parse_stmt()?;
        let else_branch = if self.try_kw(Keyword::Else)? {
            Some(self.parse_stmt()?)
        } else {
            None
        };
        Ok(Statement::If(Box::new(If {
            cond,
            then_branch,
            else_branch,
        })))
    }

    fn parse_for_stmt(&mut self) -> TResult<Statement> {
        self.expect_punct(Punct::LParen)?;
        let init = if self.try_punct(Punct::Semicolon)? {
            None
        } else {
            let init = self.parse_expr()?;
            self.expect_punct(Punct::Semicolon)?;
            Some(init)
        };
        let cond = if self.try_punct(Punct::Semicolon)? {
            None
        } else {
            let cond = self.parse_expr()?;
            self.check_scalar(&cond)?;
            self.expect_punct(Punct::Semicolon)?;
            Some(cond)
        };
        let step = if self.try_punct(Punct::RParen)? {
            None
        } else {
            let step = self.parse_expr()?;
            self.expect_punct(Punct::RParen)?;
            Some(step)
        };
        let body = self.parse_stmt()?;
        Ok(Statement::For(Box::new(For {
            init,
            cond,
            step,
            body,
        })))
    }

    fn parse_do_while_stmt(&mut self) -> TResult<Statement> {
        let body = self.parse_stmt()?;
        self.expect_kw(Keyword::While)?;
        let cond = self.parse_cond_in_parens()?;
        self.expect_punct(Punct::Semicolon)?;
        Ok(Statement::DoWhile(Box::new(DoWhile { cond, body })))
    }

    fn parse_while_stmt(&mut self) -> TResult<Statement> {
        let cond = self.parse_cond_in_parens()?;
        let body = self.parse_stmt()?;
        Ok(Statement::While(Box::new(While { cond, body })))
    }

    fn parse_return_stmt(&mut self) -> TResult<Statement> {
        let ret = self.ret.clone().expect("return outside of a function");

        if self.try_punct(Punct::Semicolon)? {
            if ret != CType::Void {
                return Err(
                    self.err_here("'return' with no value, in function returning non-void")
                );
            }
            return Ok(Statement::Return(Return { value: None }));
        }

        let value = self.parse_expr()?;
        if !value.ctype().compatible(&ret) {
            return Err(self.err_here(format!(
                "return makes {} from {} without a cast",
                ret,
                value.ctype()
            )));
        }
        self.expect_punct(Punct::Semicolon)?;
        Ok(Statement::Return(Return { value: Some(value) }))
    }

    /* external definitions */

    /// function-definition or top-level prototype.
    fn parse_func(&mut self) -> TResult<Function> {
        let base = self.parse_decl_spec()?;
        let (name, ret, params) = match self.parse_declarator(base)? {
            Declared::Func { name, ret, params } => (name, ret, params),
            Declared::Var { name, .. } => {
                return Err(self.err_here(format!(
                    "expected function definition for '{name}' (global variables are not supported)"
                )));
            }
        };

        let sig = FuncSig {
            ret: ret.clone(),
            params: params.iter().map(|p| p.ctype.clone()).collect(),
            variadic: false,
        };

        let int_params = params.iter().filter(|p| !p.ctype.is_float()).count();
        let float_params = params.iter().filter(|p| p.ctype.is_float()).count();
        if int_params > 6 {
            return Err(self.err_here(format!(
                "more than 6 integer parameters of '{name}' are not supported"
            )));
        }
        if float_params > 8 {
            return Err(self.err_here(format!(
                "more than 8 floating-point parameters of '{name}' are not supported"
            )));
        }

        match self.env.lookup(&name) {
            Some(Symbol::Func(old)) if *old != sig => {
                return Err(self.err_here(format!("conflicting types for '{name}'")));
            }
            Some(Symbol::Var { .. }) => {
                return Err(self.err_here(format!("'{name}' redeclared as different kind of symbol")));
            }
            _ => {}
        }
        // visible before the body so the function can call itself
        self.env.insert_global(&name, Symbol::Func(sig.clone()));

        if self.try_punct(Punct::Semicolon)? {
            return Ok(Function {
                name,
                sig,
                params,
                body: None,
            });
        }

        self.expect_punct(Punct::LBrace)?;
        if !self.defined.insert(name.clone()) {
            return Err(self.err_here(format!("redefinition of '{name}'")));
        }
        self.env.push();
        for param in &params {
            if self.env.contains_in_current_scope(&param.name) {
                return Err(self.err_here(format!("redeclaration of '{}'", param.name)));
            }
            self.env.insert(
                &param.name,
                Symbol::Var {
                    ctype: param.ctype.clone(),
                },
            );
        }
        self.ret = Some(ret);
        let body = self.parse_compound_stmt()?;
        self.env.pop();
        self.ret = None;

        Ok(Function {
            name,
            sig,
            params,
            body: Some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn parse_program(input: &str) -> TResult<Ast> {
        Parser::new(Lexer::new("test.c", input)).parse()
    }

    fn parse_err(input: &str) -> String {
        parse_program(input).unwrap_err().message
    }

    #[test]
    fn test_parse_minimal_main() {
        let ast = parse_program("int main(void) { return 0; }").unwrap();

        let [main] = ast.nodes() else {
            panic!("expected exactly one function");
        };
        assert_eq!(main.name, "main");
        assert_eq!(main.sig.ret, CType::Int);
        assert!(main.sig.params.is_empty());
        assert!(main.body.is_some());
    }

    #[test]
    fn test_prototype_then_definition() {
        let ast = parse_program("int f(int x); int f(int x) { return x; }").unwrap();

        assert_eq!(ast.nodes().len(), 2);
        assert!(ast.nodes()[0].body.is_none());
        assert!(ast.nodes()[1].body.is_some());
    }

    #[test]
    fn test_conflicting_prototype() {
        let message = parse_err("int f(int x); double f(int x) { return 1.0; }");
        assert!(message.contains("conflicting types for 'f'"));
    }

    #[test]
    fn test_pointer_declarator() {
        let ast = parse_program("int main(void) { int *p; int **q; return 0; }").unwrap();

        let Some(Statement::Declaration(decl)) =
            ast.nodes()[0].body.as_ref().map(|b| &b.statements[0])
        else {
            panic!("expected declaration");
        };
        assert_eq!(decl.declarators[0].ctype, CType::Int.pointer_to());
    }

    #[test]
    fn test_array_declarator_with_init_list() {
        let ast = parse_program("int main(void) { int a[4] = {1, 2, 3}; return 0; }").unwrap();

        let Some(Statement::Declaration(decl)) =
            ast.nodes()[0].body.as_ref().map(|b| &b.statements[0])
        else {
            panic!("expected declaration");
        };
        assert_eq!(decl.declarators[0].ctype, CType::Array(Box::new(CType::Int), 4));
        let Some(Initializer::List(inits)) = &decl.declarators[0].init else {
            panic!("expected initializer list");
        };
        assert_eq!(inits.len(), 3);
    }

    #[test]
    fn test_excess_array_initializers() {
        let message = parse_err("int main(void) { int a[2] = {1, 2, 3}; return 0; }");
        assert!(message.contains("excess elements"));
    }

    #[test]
    fn test_variable_declared_void() {
        let message = parse_err("int main(void) { void x; return 0; }");
        assert!(message.contains("declared void"));
    }

    #[test]
    fn test_redeclaration_in_same_scope() {
        let message = parse_err("int main(void) { int x; double x; return 0; }");
        assert!(message.contains("redeclaration of 'x'"));
    }

    #[test]
    fn test_shadowing_in_inner_scope_is_fine() {
        assert!(parse_program("int main(void) { int x; { double x; } return 0; }").is_ok());
    }

    #[test]
    fn test_identifier_out_of_scope() {
        let message = parse_err("int main(void) { { int inner; } inner = 1; return 0; }");
        assert!(message.contains("'inner' undeclared"));
    }

    #[test]
    fn test_return_type_mismatch() {
        let message = parse_err("int f(void) { return \"x\"; }");
        assert!(message.contains("return makes int from pointer"));
    }

    #[test]
    fn test_bare_return_in_non_void_function() {
        let message = parse_err("int f(void) { return; }");
        assert!(message.contains("'return' with no value"));
    }

    #[test]
    fn test_bare_return_in_void_function() {
        assert!(parse_program("void f(void) { return; }").is_ok());
    }

    #[test]
    fn test_missing_semicolon() {
        let message = parse_err("int main(void) { return 0 }");
        assert!(message.contains("expected ';'"));
    }

    #[test]
    fn test_recursion_is_visible() {
        assert!(parse_program(
            "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }"
        )
        .is_ok());
    }

    #[test]
    fn test_comma_chained_declarators() {
        let ast = parse_program("int main(void) { int a, *p, b = 1; return 0; }").unwrap();

        let Some(Statement::Declaration(decl)) =
            ast.nodes()[0].body.as_ref().map(|b| &b.statements[0])
        else {
            panic!("expected declaration");
        };
        assert_eq!(decl.declarators.len(), 3);
        assert_eq!(decl.declarators[1].ctype, CType::Int.pointer_to());
        assert!(decl.declarators[2].init.is_some());
    }

    #[test]
    fn test_null_statement() {
        let ast = parse_program("int main(void) { ;; return 0; }").unwrap();
        let body = ast.nodes()[0].body.as_ref().unwrap();
        assert_eq!(body.statements[0], Statement::Empty);
    }
}
