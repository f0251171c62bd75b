//! Recursive-descent parser for the traced language. Produces an
//! [`crate::ast::Program`] whose every node is stamped with the position of
//! its first token, for the per-step `line`/`col` the stepping engine reports.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Tok, Token};

pub fn parse(src: &str) -> Result<Program, ParseError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        src,
        tokens,
        idx: 0,
    };
    let mut body = parser.parse_stmts_until_eof()?;
    rewrite_leading_directive(&mut body);
    Ok(Program { body })
}

/// A bare string-literal statement in leading position is a directive
/// prologue (`'use strict';`), not a steppable expression statement.
fn rewrite_leading_directive(body: &mut [Stmt]) {
    if let Some(first) = body.first_mut() {
        if let StmtKind::Expr(Expr {
            kind: ExprKind::String(s),
            ..
        }) = &first.kind
        {
            first.kind = StmtKind::Directive(s.clone());
        }
    }
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    idx: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.idx].tok
    }

    fn pos(&self) -> Pos {
        self.tokens[self.idx].pos
    }

    fn byte_offset(&self) -> usize {
        // Re-locate the current token's byte offset by scanning from the
        // start once; only used at function boundaries, so this stays O(n)
        // in source length rather than carrying an extra field everywhere.
        let pos = self.pos();
        let mut line = 1u32;
        let mut col = 1u32;
        for (idx, byte) in self.src.bytes().enumerate() {
            if line == pos.line && col == pos.col {
                return idx;
            }
            if byte == b'\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        self.src.len()
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.idx].clone();
        if self.idx + 1 < self.tokens.len() {
            self.idx += 1;
        }
        tok
    }

    fn check_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(x) if *x == p)
    }

    fn check_keyword(&self, k: &str) -> bool {
        matches!(self.peek(), Tok::Keyword(x) if *x == k)
    }

    fn eat_punct(&mut self, p: &'static str) -> Result<(), ParseError> {
        if self.check_punct(p) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {p:?}")))
        }
    }

    fn eat_keyword(&mut self, k: &'static str) -> Result<(), ParseError> {
        if self.check_keyword(k) {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected keyword {k:?}")))
        }
    }

    fn eat_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn unexpected(&self, message: &str) -> ParseError {
        let pos = self.pos();
        ParseError {
            line: pos.line,
            col: pos.col,
            message: format!("{message}, found {:?}", self.peek()),
        }
    }

    fn parse_stmts_until_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !matches!(self.peek(), Tok::Eof) {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.eat_punct("{")?;
        let mut stmts = Vec::new();
        while !self.check_punct("}") {
            stmts.push(self.parse_stmt()?);
        }
        self.eat_punct("}")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.pos();
        if self.check_keyword("var") {
            return self.parse_var_decl(pos);
        }
        if self.check_keyword("function") {
            let def = self.parse_function(false)?;
            return Ok(Stmt {
                pos,
                kind: StmtKind::FunctionDecl(def),
            });
        }
        if self.check_keyword("debugger") {
            self.advance();
            self.eat_punct(";")?;
            return Ok(Stmt {
                pos,
                kind: StmtKind::Debugger,
            });
        }
        if self.check_keyword("return") {
            self.advance();
            let expr = if self.check_punct(";") {
                None
            } else {
                Some(self.parse_expr()?)
            };
            self.eat_punct(";")?;
            return Ok(Stmt {
                pos,
                kind: StmtKind::Return(expr),
            });
        }
        if self.check_keyword("throw") {
            self.advance();
            let expr = self.parse_expr()?;
            self.eat_punct(";")?;
            return Ok(Stmt {
                pos,
                kind: StmtKind::Throw(expr),
            });
        }
        if self.check_keyword("if") {
            return self.parse_if(pos);
        }
        if self.check_keyword("while") {
            return self.parse_while(pos);
        }
        if self.check_keyword("for") {
            return self.parse_for(pos);
        }
        if self.check_keyword("try") {
            return self.parse_try(pos);
        }
        if self.check_punct("{") {
            let body = self.parse_block()?;
            return Ok(Stmt {
                pos,
                kind: StmtKind::Block(body),
            });
        }
        let expr = self.parse_expr()?;
        self.eat_punct(";")?;
        Ok(Stmt {
            pos,
            kind: StmtKind::Expr(expr),
        })
    }

    fn parse_var_decl(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.advance();
        let mut decls = Vec::new();
        loop {
            let name = self.eat_ident()?;
            let init = if self.check_punct("=") {
                self.advance();
                Some(self.parse_assign()?)
            } else {
                None
            };
            decls.push((name, init));
            if self.check_punct(",") {
                self.advance();
                continue;
            }
            break;
        }
        self.eat_punct(";")?;
        Ok(Stmt {
            pos,
            kind: StmtKind::VarDecl(decls),
        })
    }

    fn parse_if(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.advance();
        self.eat_punct("(")?;
        let cond = self.parse_expr()?;
        self.eat_punct(")")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.check_keyword("else") {
            self.advance();
            if self.check_keyword("if") {
                let pos = self.pos();
                Some(vec![self.parse_if(pos)?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt {
            pos,
            kind: StmtKind::If {
                cond,
                then_branch,
                else_branch,
            },
        })
    }

    fn parse_while(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.advance();
        self.eat_punct("(")?;
        let cond = self.parse_expr()?;
        self.eat_punct(")")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            pos,
            kind: StmtKind::While { cond, body },
        })
    }

    fn parse_for(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.advance();
        self.eat_punct("(")?;
        let init = if self.check_punct(";") {
            None
        } else if self.check_keyword("var") {
            Some(Box::new(self.parse_var_decl(self.pos())?))
        } else {
            let expr_pos = self.pos();
            let expr = self.parse_expr()?;
            self.eat_punct(";")?;
            Some(Box::new(Stmt {
                pos: expr_pos,
                kind: StmtKind::Expr(expr),
            }))
        };
        if init.is_none() {
            self.eat_punct(";")?;
        }
        let cond = if self.check_punct(";") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat_punct(";")?;
        let step = if self.check_punct(")") {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat_punct(")")?;
        let body = self.parse_block()?;
        Ok(Stmt {
            pos,
            kind: StmtKind::For {
                init,
                cond,
                step,
                body,
            },
        })
    }

    fn parse_try(&mut self, pos: Pos) -> Result<Stmt, ParseError> {
        self.advance();
        let try_block = self.parse_block()?;
        self.eat_keyword("catch")?;
        self.eat_punct("(")?;
        let catch_param = self.eat_ident()?;
        self.eat_punct(")")?;
        let catch_block = self.parse_block()?;
        Ok(Stmt {
            pos,
            kind: StmtKind::TryCatch {
                try_block,
                catch_param,
                catch_block,
            },
        })
    }

    fn parse_function(&mut self, is_expression: bool) -> Result<FunctionDef, ParseError> {
        let start = self.byte_offset();
        self.eat_keyword("function")?;
        let name = if matches!(self.peek(), Tok::Ident(_)) {
            self.eat_ident()?
        } else {
            String::new()
        };
        self.eat_punct("(")?;
        let mut params = Vec::new();
        while !self.check_punct(")") {
            params.push(self.eat_ident()?);
            if self.check_punct(",") {
                self.advance();
            }
        }
        self.eat_punct(")")?;
        let mut body = self.parse_block()?;
        rewrite_leading_directive(&mut body);
        let end = self.byte_offset();
        Ok(FunctionDef {
            name,
            params,
            body,
            source_range: (start, end),
            is_expression,
        })
    }

    // Precedence, low to high: assignment, logical-or, logical-and,
    // equality, relational, additive, multiplicative, unary, call/member.
    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        let target = self.parse_logical_or()?;
        if self.check_punct("=") {
            self.advance();
            let value = self.parse_assign()?;
            return Ok(Expr {
                pos,
                kind: ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
            });
        }
        Ok(target)
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_logical_and()?;
        while self.check_punct("||") {
            let pos = self.pos();
            self.advance();
            let right = self.parse_logical_and()?;
            left = Expr {
                pos,
                kind: ExprKind::Logical {
                    op: LogicalOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check_punct("&&") {
            let pos = self.pos();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr {
                pos,
                kind: ExprKind::Logical {
                    op: LogicalOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("===") => BinaryOp::StrictEq,
                Tok::Punct("!==") => BinaryOp::StrictNotEq,
                Tok::Punct("==") => BinaryOp::Eq,
                Tok::Punct("!=") => BinaryOp::NotEq,
                _ => break,
            };
            let pos = self.pos();
            self.advance();
            let right = self.parse_relational()?;
            left = Expr {
                pos,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("<=") => BinaryOp::LtEq,
                Tok::Punct(">=") => BinaryOp::GtEq,
                Tok::Punct("<") => BinaryOp::Lt,
                Tok::Punct(">") => BinaryOp::Gt,
                _ => break,
            };
            let pos = self.pos();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr {
                pos,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("+") => BinaryOp::Add,
                Tok::Punct("-") => BinaryOp::Sub,
                _ => break,
            };
            let pos = self.pos();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr {
                pos,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("*") => BinaryOp::Mul,
                Tok::Punct("/") => BinaryOp::Div,
                Tok::Punct("%") => BinaryOp::Mod,
                _ => break,
            };
            let pos = self.pos();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr {
                pos,
                kind: ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        if self.check_punct("-") {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr {
                pos,
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(expr),
                },
            });
        }
        if self.check_punct("!") {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr {
                pos,
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    expr: Box::new(expr),
                },
            });
        }
        if self.check_keyword("typeof") {
            self.advance();
            let expr = self.parse_unary()?;
            return Ok(Expr {
                pos,
                kind: ExprKind::Unary {
                    op: UnaryOp::Typeof,
                    expr: Box::new(expr),
                },
            });
        }
        if self.check_keyword("new") {
            self.advance();
            let primary = self.parse_primary()?;
            let callee = self.parse_member_chain(primary, false)?;
            let args = if self.check_punct("(") {
                self.parse_args()?
            } else {
                Vec::new()
            };
            let new_expr = Expr {
                pos,
                kind: ExprKind::New {
                    callee: Box::new(callee),
                    args,
                },
            };
            return self.parse_member_chain(new_expr, true);
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let primary = self.parse_primary()?;
        self.parse_member_chain(primary, true)
    }

    fn parse_member_chain(&mut self, mut expr: Expr, allow_call: bool) -> Result<Expr, ParseError> {
        loop {
            if self.check_punct(".") {
                let pos = self.pos();
                self.advance();
                let name = self.eat_ident()?;
                expr = Expr {
                    pos,
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(Expr {
                            pos,
                            kind: ExprKind::String(name),
                        }),
                        computed: false,
                    },
                };
            } else if self.check_punct("[") {
                let pos = self.pos();
                self.advance();
                let property = self.parse_expr()?;
                self.eat_punct("]")?;
                expr = Expr {
                    pos,
                    kind: ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        computed: true,
                    },
                };
            } else if allow_call && self.check_punct("(") {
                let pos = self.pos();
                let args = self.parse_args()?;
                expr = Expr {
                    pos,
                    kind: ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.eat_punct("(")?;
        let mut args = Vec::new();
        while !self.check_punct(")") {
            args.push(self.parse_assign()?);
            if self.check_punct(",") {
                self.advance();
            }
        }
        self.eat_punct(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let pos = self.pos();
        match self.peek().clone() {
            Tok::Number(n) => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Number(n),
                })
            }
            Tok::String(s) => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::String(s),
                })
            }
            Tok::Keyword("true") => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Bool(true),
                })
            }
            Tok::Keyword("false") => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Bool(false),
                })
            }
            Tok::Keyword("null") => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Null,
                })
            }
            Tok::Keyword("undefined") => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Undefined,
                })
            }
            Tok::Keyword("this") => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::This,
                })
            }
            Tok::Keyword("function") => {
                let def = self.parse_function(true)?;
                Ok(Expr {
                    pos,
                    kind: ExprKind::Function(def),
                })
            }
            Tok::Ident(name) => {
                self.advance();
                Ok(Expr {
                    pos,
                    kind: ExprKind::Identifier(name),
                })
            }
            Tok::Punct("(") => {
                self.advance();
                let expr = self.parse_expr()?;
                self.eat_punct(")")?;
                Ok(expr)
            }
            Tok::Punct("[") => self.parse_array(pos),
            Tok::Punct("{") => self.parse_object(pos),
            _ => Err(self.unexpected("expected an expression")),
        }
    }

    fn parse_array(&mut self, pos: Pos) -> Result<Expr, ParseError> {
        self.eat_punct("[")?;
        let mut items = Vec::new();
        while !self.check_punct("]") {
            items.push(self.parse_assign()?);
            if self.check_punct(",") {
                self.advance();
            }
        }
        self.eat_punct("]")?;
        Ok(Expr {
            pos,
            kind: ExprKind::Array(items),
        })
    }

    fn parse_object(&mut self, pos: Pos) -> Result<Expr, ParseError> {
        self.eat_punct("{")?;
        let mut props = Vec::new();
        while !self.check_punct("}") {
            let key = match self.peek().clone() {
                Tok::Ident(name) => {
                    self.advance();
                    name
                }
                Tok::String(s) => {
                    self.advance();
                    s
                }
                _ => return Err(self.unexpected("expected a property key")),
            };
            self.eat_punct(":")?;
            let value = self.parse_assign()?;
            props.push((key, value));
            if self.check_punct(",") {
                self.advance();
            }
        }
        self.eat_punct("}")?;
        Ok(Expr {
            pos,
            kind: ExprKind::Object(props),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_var_decls() {
        let program = parse("var x=1; var y=2; var z=x+y;").unwrap();
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn parses_function_with_body_range() {
        let src = "function f(n){return n+1;} var r=f(41);";
        let program = parse(src).unwrap();
        let StmtKind::FunctionDecl(def) = &program.body[0].kind else {
            panic!("expected function decl");
        };
        let (start, end) = def.source_range;
        assert_eq!(&src[start..end], "function f(n){return n+1;}");
    }

    #[test]
    fn parses_new_expression() {
        let program = parse("function C(){this.x=1;} var o=new C();").unwrap();
        let StmtKind::Expr(expr) = &program.body[1].kind else {
            panic!()
        };
        let ExprKind::Assign { value, .. } = &expr.kind else {
            panic!()
        };
        assert!(matches!(value.kind, ExprKind::New { .. }));
    }

    #[test]
    fn parse_error_reports_location() {
        let err = parse("var bad = (;").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
