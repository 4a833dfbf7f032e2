use crate::ast::{AssignTarget, BinaryOp, ConstructorDecl, Expr, FieldInit, Program, TypeRef};
use crate::datatype::BUILTIN_KINDS;
use crate::error::{KestrelError, Position, Span};
use crate::lexer::{unescape, Token, TokenType};
use crate::number::Number;
use crate::value::Value;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// Accepts a stream with or without a trailing `Eof`; one is appended if missing.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map_or(true, |token| token.token_type != TokenType::Eof) {
            let (end, position) = tokens
                .last()
                .map(|token| (token.span.end, token.position))
                .unwrap_or((0, Position { line: 1, column: 1 }));
            tokens.push(Token::new(TokenType::Eof, String::new(), Span::single(end), position));
        }
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> Result<Program, KestrelError> {
        if self.is_at_end() {
            return Err(self.error_at_current_with_help(
                "Expected at least one statement",
                "A program consists of statements separated by ';'. Example: x = 1;",
            ));
        }

        let mut statements = Vec::new();
        while !self.is_at_end() {
            let statement = self.parse_statement()?;
            if !self.match_types(&[TokenType::Semicolon]) && !statement.is_block() && !self.is_at_end() {
                return Err(self.error_at_current_with_help(
                    "Expected ';' after statement",
                    "Top-level statements are terminated with ';'. Example: x = 1; y = 2;",
                ));
            }
            statements.push(statement);
        }

        Ok(Program { statements })
    }

    /// Parses one declaration, assignment or expression, without its terminator.
    pub fn parse_statement(&mut self) -> Result<Expr, KestrelError> {
        if self.match_types(&[TokenType::Datatype]) {
            return self.datatype_declaration();
        }

        if self.check(&TokenType::Identifier) {
            match self.type_at(self.current + 1) {
                TokenType::LeftBrace => return self.index_assignment(),
                TokenType::Equal => return self.assignment(),
                TokenType::Identifier if self.is_function_definition() => {
                    return self.function_definition()
                }
                _ => {}
            }
        }

        if self.ends_in_field_target() {
            let start = self.current;
            if let Ok(Expr::FieldAccess { object, field, .. }) = self.postfix() {
                if self.match_types(&[TokenType::Equal]) {
                    return self.field_assignment(*object, field);
                }
            }
            self.current = start;
        }

        self.parse_expression()
    }

    pub fn parse_expression(&mut self) -> Result<Expr, KestrelError> {
        self.or()
    }

    fn type_at(&self, index: usize) -> TokenType {
        self.tokens
            .get(index)
            .map(|token| token.token_type)
            .unwrap_or(TokenType::Eof)
    }

    /// `name param1 param2 ... =`
    fn is_function_definition(&self) -> bool {
        let mut pos = self.current + 1;
        while self.type_at(pos) == TokenType::Identifier {
            pos += 1;
        }
        pos > self.current + 1 && self.type_at(pos) == TokenType::Equal
    }

    /// True when the first `=` outside brackets, before the statement ends,
    /// directly follows `.field`. Only then is a field assignment attempted.
    fn ends_in_field_target(&self) -> bool {
        let mut depth = 0usize;
        let mut pos = self.current;
        loop {
            match self.type_at(pos) {
                TokenType::LeftParen | TokenType::LeftBracket | TokenType::LeftBrace => depth += 1,
                TokenType::RightParen | TokenType::RightBracket | TokenType::RightBrace => {
                    if depth == 0 {
                        return false;
                    }
                    depth -= 1;
                }
                TokenType::Eof => return false,
                TokenType::Semicolon if depth == 0 => return false,
                TokenType::Equal if depth == 0 => {
                    return pos >= self.current + 2
                        && self.type_at(pos - 1) == TokenType::Identifier
                        && self.type_at(pos - 2) == TokenType::Dot;
                }
                _ => {}
            }
            pos += 1;
        }
    }

    fn assignment(&mut self) -> Result<Expr, KestrelError> {
        let name_token = self.advance().clone();
        self.advance(); // '='
        let value = self.assigned_value(&name_token.lexeme)?;
        let span = name_token.span.to(value.span());

        Ok(Expr::Assign {
            target: AssignTarget::Variable(name_token.lexeme),
            value: Box::new(value),
            span,
        })
    }

    fn assigned_value(&mut self, target: &str) -> Result<Expr, KestrelError> {
        if self.is_at_end() || self.check(&TokenType::Semicolon) {
            return Err(KestrelError::parse_error_with_help(
                self.peek().span.clone(),
                format!("Expected expression after '{} ='", target),
                "Assignments need a value on the right-hand side. Example: x = 42;".to_string(),
            ));
        }
        self.parse_expression()
    }

    fn index_assignment(&mut self) -> Result<Expr, KestrelError> {
        let name_token = self.advance().clone();
        self.advance(); // '{'
        let index = self.parse_expression()?;
        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after index",
            "Index assignment has the form name{index} = value.".to_string(),
        )?;
        self.consume_with_help(
            TokenType::Equal,
            "Expected '=' after indexed target",
            "Index assignment has the form name{index} = value.".to_string(),
        )?;
        let value = self.assigned_value(&name_token.lexeme)?;
        let span = name_token.span.to(value.span());

        Ok(Expr::IndexAssign {
            name: name_token.lexeme,
            index: Box::new(index),
            value: Box::new(value),
            span,
        })
    }

    fn function_definition(&mut self) -> Result<Expr, KestrelError> {
        let name_token = self.advance().clone();
        let mut params = Vec::new();
        while self.check(&TokenType::Identifier) {
            let param = self.advance().clone();
            self.push_param(&mut params, param)?;
        }
        self.advance(); // '='
        let body = self.assigned_value(&name_token.lexeme)?;
        let span = name_token.span.to(body.span());

        Ok(Expr::FunctionDef {
            name: name_token.lexeme,
            params,
            body: Box::new(body),
            span,
        })
    }

    fn push_param(&self, params: &mut Vec<String>, param: Token) -> Result<(), KestrelError> {
        if params.contains(&param.lexeme) {
            return Err(KestrelError::parse_error(
                param.span,
                format!("Duplicate parameter '{}'", param.lexeme),
            ));
        }
        params.push(param.lexeme);
        Ok(())
    }

    /// `object.field = value`, where `object` is any postfix expression.
    fn field_assignment(&mut self, object: Expr, field: String) -> Result<Expr, KestrelError> {
        let value = self.assigned_value(&field)?;
        let span = object.span().to(value.span());

        Ok(Expr::Assign {
            target: AssignTarget::Field {
                object: Box::new(object),
                field,
            },
            value: Box::new(value),
            span,
        })
    }

    fn datatype_declaration(&mut self) -> Result<Expr, KestrelError> {
        let start = self.previous().span.clone();
        let name_token = self
            .consume_with_help(
                TokenType::Identifier,
                "Expected type name after 'datatype'",
                "Example: datatype Shape = Circle{radius} | Square{size};".to_string(),
            )?
            .clone();
        if BUILTIN_KINDS.contains(&name_token.lexeme.as_str()) {
            return Err(KestrelError::parse_error(
                name_token.span,
                format!("'{}' is a built-in type name", name_token.lexeme),
            ));
        }
        self.consume_with_help(
            TokenType::Equal,
            "Expected '=' after type name",
            "Example: datatype Shape = Circle{radius} | Square{size};".to_string(),
        )?;

        let mut constructors: Vec<ConstructorDecl> = Vec::new();
        if self.check(&TokenType::LeftBrace) {
            let open = self.peek().span.clone();
            let fields = self.field_list()?;
            constructors.push(ConstructorDecl {
                name: None,
                fields,
                span: open.to(&self.previous().span),
            });
            if self.check(&TokenType::Pipe) {
                return Err(KestrelError::parse_error_with_help(
                    self.peek().span.clone(),
                    "An anonymous constructor cannot be combined with other constructors".to_string(),
                    "Either declare datatype T = {fields}; or name every constructor.".to_string(),
                ));
            }
        } else {
            loop {
                let ctor_token = self
                    .consume_with_help(
                        TokenType::Identifier,
                        "Expected constructor name",
                        "Constructors look like Name{field1, field2}.".to_string(),
                    )?
                    .clone();
                if constructors
                    .iter()
                    .any(|c| c.name.as_deref() == Some(ctor_token.lexeme.as_str()))
                {
                    return Err(KestrelError::parse_error(
                        ctor_token.span,
                        format!("Duplicate constructor '{}'", ctor_token.lexeme),
                    ));
                }
                let fields = self.field_list()?;
                constructors.push(ConstructorDecl {
                    name: Some(ctor_token.lexeme),
                    fields,
                    span: ctor_token.span.to(&self.previous().span),
                });
                if !self.match_types(&[TokenType::Pipe]) {
                    break;
                }
            }
        }

        Ok(Expr::DataTypeDecl {
            name: name_token.lexeme,
            constructors,
            span: start.to(&self.previous().span),
        })
    }

    /// `{ field, field, ... }`
    fn field_list(&mut self) -> Result<Vec<String>, KestrelError> {
        self.consume_with_help(
            TokenType::LeftBrace,
            "Expected '{' before field list",
            "Constructors list their fields in braces: Name{field1, field2}.".to_string(),
        )?;
        let mut fields: Vec<String> = Vec::new();
        if !self.check(&TokenType::RightBrace) {
            loop {
                let field = self.consume(TokenType::Identifier, "Expected field name")?.clone();
                if fields.contains(&field.lexeme) {
                    return Err(KestrelError::parse_error(
                        field.span,
                        format!("Duplicate field '{}'", field.lexeme),
                    ));
                }
                fields.push(field.lexeme);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        self.consume_with_help(
            TokenType::RightBrace,
            "Expected '}' after field list",
            "Field lists are closed with '}'.".to_string(),
        )?;
        Ok(fields)
    }

    fn or(&mut self) -> Result<Expr, KestrelError> {
        let mut expr = self.and()?;

        while self.match_types(&[TokenType::Or]) {
            let operator_token = self.previous().clone();
            let right = self.operand_after(&operator_token, Self::and)?;
            expr = binary(expr, BinaryOp::Or, right);
        }

        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, KestrelError> {
        let mut expr = self.comparison()?;

        while self.match_types(&[TokenType::And]) {
            let operator_token = self.previous().clone();
            let right = self.operand_after(&operator_token, Self::comparison)?;
            expr = binary(expr, BinaryOp::And, right);
        }

        Ok(expr)
    }

    fn comparison(&mut self) -> Result<Expr, KestrelError> {
        let mut expr = self.additive()?;

        loop {
            if self.match_types(&[
                TokenType::Equal,
                TokenType::BangEqual,
                TokenType::Less,
                TokenType::LessEqual,
                TokenType::Greater,
                TokenType::GreaterEqual,
            ]) {
                let operator_token = self.previous().clone();
                let operator = match operator_token.token_type {
                    TokenType::Equal => BinaryOp::Equal,
                    TokenType::BangEqual => BinaryOp::NotEqual,
                    TokenType::Less => BinaryOp::Less,
                    TokenType::LessEqual => BinaryOp::LessEqual,
                    TokenType::Greater => BinaryOp::Greater,
                    TokenType::GreaterEqual => BinaryOp::GreaterEqual,
                    _ => unreachable!(),
                };
                let right = self.operand_after(&operator_token, Self::additive)?;
                expr = binary(expr, operator, right);
            } else if self.match_types(&[TokenType::Isa]) {
                let (type_ref, end) = self.type_ref()?;
                let span = expr.span().to(&end);
                expr = Expr::Isa {
                    expr: Box::new(expr),
                    type_ref,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn type_ref(&mut self) -> Result<(TypeRef, Span), KestrelError> {
        let help = "Example: shape isa Shape or shape isa Shape$Circle".to_string();
        let name = self
            .consume_with_help(TokenType::Identifier, "Expected type name after 'isa'", help.clone())?
            .clone();
        let mut end = name.span.clone();
        let constructor = if self.match_types(&[TokenType::Dollar]) {
            let constructor = self
                .consume_with_help(TokenType::Identifier, "Expected constructor name after '$'", help)?
                .clone();
            end = constructor.span;
            Some(constructor.lexeme)
        } else {
            None
        };

        Ok((
            TypeRef {
                type_name: name.lexeme,
                constructor,
            },
            end,
        ))
    }

    fn additive(&mut self) -> Result<Expr, KestrelError> {
        let mut expr = self.term()?;

        while self.match_types(&[TokenType::Plus, TokenType::Minus]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Plus => BinaryOp::Add,
                TokenType::Minus => BinaryOp::Subtract,
                _ => unreachable!(),
            };
            let right = self.operand_after(&operator_token, Self::term)?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, KestrelError> {
        let mut expr = self.signed_factor()?;

        while self.match_types(&[TokenType::Star, TokenType::Slash]) {
            let operator_token = self.previous().clone();
            let operator = match operator_token.token_type {
                TokenType::Star => BinaryOp::Multiply,
                TokenType::Slash => BinaryOp::Divide,
                _ => unreachable!(),
            };
            let right = self.operand_after(&operator_token, Self::signed_factor)?;
            expr = binary(expr, operator, right);
        }

        Ok(expr)
    }

    /// Leading `+`/`-`. Negative numeric constants are folded; anything else
    /// becomes `0 - operand`.
    fn signed_factor(&mut self) -> Result<Expr, KestrelError> {
        if self.match_types(&[TokenType::Plus, TokenType::Minus]) {
            let sign = self.previous().clone();
            let operand = self.operand_after(&sign, Self::signed_factor)?;
            if sign.token_type == TokenType::Plus {
                return Ok(operand);
            }
            let span = sign.span.to(operand.span());
            return Ok(match operand {
                Expr::Constant {
                    value: Value::Num(n),
                    ..
                } => Expr::Constant {
                    value: Value::Num(n.negate()),
                    span,
                },
                operand => Expr::Binary {
                    left: Box::new(Expr::Constant {
                        value: Value::Num(Number::zero()),
                        span: sign.span,
                    }),
                    operator: BinaryOp::Subtract,
                    right: Box::new(operand),
                    span,
                },
            });
        }

        self.factor()
    }

    /// `postfix ('^' signed_factor)?`. Right-associative through the recursion.
    fn factor(&mut self) -> Result<Expr, KestrelError> {
        let base = self.postfix()?;

        if self.match_types(&[TokenType::Caret]) {
            let operator_token = self.previous().clone();
            let exponent = self.operand_after(&operator_token, Self::signed_factor)?;
            return Ok(binary(base, BinaryOp::Power, exponent));
        }

        Ok(base)
    }

    fn operand_after(
        &mut self,
        operator_token: &Token,
        parse: fn(&mut Self) -> Result<Expr, KestrelError>,
    ) -> Result<Expr, KestrelError> {
        if self.is_at_end() {
            return Err(KestrelError::parse_error_with_help(
                operator_token.span.clone(),
                format!("Expected expression after '{}'", operator_token.lexeme),
                "Operators require expressions on both sides.".to_string(),
            ));
        }
        parse(self)
    }

    /// Call/index `(...)` and field access `.name` suffixes. Literal numbers,
    /// booleans and characters take no suffix, so `if a = 0 (x) else y`
    /// keeps `0` as the condition's right operand.
    fn postfix(&mut self) -> Result<Expr, KestrelError> {
        let literal = matches!(
            self.peek().token_type,
            TokenType::Number | TokenType::Boolean | TokenType::Char
        );
        let mut expr = self.primary()?;
        if literal {
            return Ok(expr);
        }

        loop {
            if self.match_types(&[TokenType::LeftParen]) {
                expr = self.finish_call(expr)?;
            } else if self.match_types(&[TokenType::Dot]) {
                let field = self
                    .consume(TokenType::Identifier, "Expected field name after '.'")?
                    .clone();
                let span = expr.span().to(&field.span);
                expr = Expr::FieldAccess {
                    object: Box::new(expr),
                    field: field.lexeme,
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn finish_call(&mut self, callee: Expr) -> Result<Expr, KestrelError> {
        let mut args = Vec::new();

        if !self.check(&TokenType::RightParen) {
            loop {
                if self.is_at_end() {
                    return Err(KestrelError::parse_error_with_help(
                        self.peek().span.clone(),
                        "Unexpected end of input in function call".to_string(),
                        "Function calls must be closed with ')' after the arguments. Example: f(a, b)".to_string(),
                    ));
                }
                args.push(self.parse_expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let paren = self.consume_with_help(
            TokenType::RightParen,
            "Expected ')' after arguments",
            "Function calls must be closed with ')' after the arguments. Example: f(a, b)".to_string(),
        )?;
        let span = callee.span().to(&paren.span);

        Ok(Expr::Call {
            callee: Box::new(callee),
            args,
            span,
        })
    }

    fn primary(&mut self) -> Result<Expr, KestrelError> {
        if self.is_at_end() {
            return Err(KestrelError::parse_error_with_help(
                self.peek().span.clone(),
                "Unexpected end of input".to_string(),
                "Expected an expression here. Check for unmatched parentheses, brackets, or incomplete statements.".to_string(),
            ));
        }

        let token = self.advance().clone();

        match token.token_type {
            TokenType::Number => {
                let value = Number::parse(&token.lexeme).ok_or_else(|| {
                    KestrelError::parse_error(token.span.clone(), format!("Invalid number '{}'", token.lexeme))
                })?;
                Ok(Expr::Constant {
                    value: Value::Num(value),
                    span: token.span,
                })
            }
            TokenType::Boolean => Ok(Expr::Constant {
                value: Value::Bool(token.lexeme == "true"),
                span: token.span,
            }),
            TokenType::Char => {
                let body = &token.lexeme[1..token.lexeme.len() - 1];
                let text = unescape(body).map_err(|message| KestrelError::parse_error(token.span.clone(), message))?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Expr::Constant {
                        value: Value::Char(c),
                        span: token.span,
                    }),
                    _ => Err(KestrelError::parse_error_with_help(
                        token.span,
                        "Character literal must contain exactly one character".to_string(),
                        "Use double quotes for strings: \"text\"".to_string(),
                    )),
                }
            }
            TokenType::String => {
                let body = &token.lexeme[1..token.lexeme.len() - 1];
                let text = unescape(body).map_err(|message| KestrelError::parse_error(token.span.clone(), message))?;
                Ok(Expr::Constant {
                    value: Value::string(&text),
                    span: token.span,
                })
            }
            TokenType::Identifier => Ok(Expr::Variable {
                name: token.lexeme,
                span: token.span,
            }),
            TokenType::LeftParen => {
                if self.check(&TokenType::RightParen) {
                    return Err(KestrelError::parse_error_with_help(
                        token.span.to(&self.peek().span),
                        "Empty parentheses are not allowed".to_string(),
                        "Parentheses must contain an expression. Example: (x + 1)".to_string(),
                    ));
                }
                let expr = self.parse_expression()?;
                self.consume_with_help(
                    TokenType::RightParen,
                    "Expected ')' after expression",
                    "Every opening parenthesis '(' must have a matching closing parenthesis ')'.".to_string(),
                )?;
                Ok(expr)
            }
            TokenType::LeftBracket => self.list_literal(token.span),
            TokenType::LeftBrace => self.block(token.span),
            TokenType::If => self.if_expression(token.span),
            TokenType::Lambda => self.lambda(token.span, true),
            TokenType::Func => self.lambda(token.span, false),
            TokenType::New => self.construction(token.span),
            TokenType::Return => Err(KestrelError::parse_error_with_help(
                token.span,
                "'return' may only introduce the final expression of a block".to_string(),
                "Example: { y = x * 2; return y }".to_string(),
            )),
            _ => {
                let help_msg = match token.token_type {
                    TokenType::RightParen => "Found ')' without matching '('. Check for unbalanced parentheses.",
                    TokenType::RightBrace => "Found '}' without matching '{'. Check for unbalanced braces.",
                    TokenType::RightBracket => "Found ']' without matching '['. Check for unbalanced brackets.",
                    TokenType::Else => "Found 'else' without a preceding 'if'.",
                    _ => "Expected a literal value, variable, or parenthesized expression here.",
                };

                Err(KestrelError::parse_error_with_help(
                    token.span,
                    format!("Expected expression, found '{}'", token.lexeme),
                    help_msg.to_string(),
                ))
            }
        }
    }

    fn list_literal(&mut self, start_span: Span) -> Result<Expr, KestrelError> {
        let mut elements = Vec::new();

        if !self.check(&TokenType::RightBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }

        let end_token = self.consume_with_help(
            TokenType::RightBracket,
            "Expected ']' after list elements",
            "List literals must be closed with ']' after the opening '['. Example: [1, 2, 3]".to_string(),
        )?;
        Ok(Expr::List {
            elements,
            span: start_span.to(&end_token.span),
        })
    }

    /// `{ stmt; stmt; result }`. A `;` right before `}` makes the last
    /// statement the result.
    fn block(&mut self, start_span: Span) -> Result<Expr, KestrelError> {
        if self.check(&TokenType::RightBrace) {
            return Err(KestrelError::parse_error_with_help(
                start_span.to(&self.peek().span),
                "Empty blocks are not allowed".to_string(),
                "A block must end with the expression it evaluates to. Example: { x = 1; x + 1 }".to_string(),
            ));
        }

        let mut items = Vec::new();
        loop {
            if self.match_types(&[TokenType::Return]) {
                items.push(self.parse_expression()?);
                self.match_types(&[TokenType::Semicolon]);
                self.consume_with_help(
                    TokenType::RightBrace,
                    "Expected '}' after return expression",
                    "'return' introduces the last expression of a block.".to_string(),
                )?;
                break;
            }

            items.push(self.parse_statement()?);
            if self.match_types(&[TokenType::Semicolon]) {
                if self.match_types(&[TokenType::RightBrace]) {
                    break;
                }
                continue;
            }
            self.consume_with_help(
                TokenType::RightBrace,
                "Expected '}' after block",
                "Statements inside a block are separated by ';' and the block is closed with '}'.".to_string(),
            )?;
            break;
        }

        let span = start_span.to(&self.previous().span);
        let result = match items.pop() {
            Some(result) => result,
            None => unreachable!("block parsed without items"),
        };
        Ok(Expr::Sequence {
            statements: items,
            result: Box::new(result),
            span,
        })
    }

    fn if_expression(&mut self, start_span: Span) -> Result<Expr, KestrelError> {
        let keyword = self.previous().clone();
        let condition = self.operand_after(&keyword, Self::parse_expression)?;
        let then_branch = self.parse_expression()?;
        self.consume_with_help(
            TokenType::Else,
            "Expected 'else' after if branch",
            "Both branches are required: if condition value else other".to_string(),
        )?;
        let else_branch = self.parse_expression()?;
        let span = start_span.to(else_branch.span());

        Ok(Expr::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
            span,
        })
    }

    /// `lambda a, b -> body` (comma-separated) or `func a b -> body`.
    fn lambda(&mut self, start_span: Span, comma_separated: bool) -> Result<Expr, KestrelError> {
        let mut params = Vec::new();
        while self.check(&TokenType::Identifier) {
            let param = self.advance().clone();
            self.push_param(&mut params, param)?;
            if comma_separated && !self.match_types(&[TokenType::Comma]) {
                break;
            }
        }
        let arrow = self
            .consume_with_help(
                TokenType::Arrow,
                "Expected '->' after parameters",
                "Example: lambda a, b -> a + b  or  func a b -> a + b".to_string(),
            )?
            .clone();
        let body = self.operand_after(&arrow, Self::parse_expression)?;
        let span = start_span.to(body.span());

        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
            span,
        })
    }

    /// `new Type(f = e, ...)` or `new Type.Ctor(f = e, ...)`
    fn construction(&mut self, start_span: Span) -> Result<Expr, KestrelError> {
        let help = "Example: new Shape.Circle(radius = 1) or new Point(x = 1, y = 2)".to_string();
        let type_name = self
            .consume_with_help(TokenType::Identifier, "Expected type name after 'new'", help.clone())?
            .lexeme
            .clone();
        let constructor = if self.match_types(&[TokenType::Dot]) {
            Some(
                self.consume_with_help(TokenType::Identifier, "Expected constructor name after '.'", help.clone())?
                    .lexeme
                    .clone(),
            )
        } else {
            None
        };
        self.consume_with_help(TokenType::LeftParen, "Expected '(' before field values", help.clone())?;

        let mut fields: Vec<FieldInit> = Vec::new();
        if !self.check(&TokenType::RightParen) {
            loop {
                let name = self
                    .consume_with_help(TokenType::Identifier, "Expected field name", help.clone())?
                    .clone();
                if fields.iter().any(|f| f.name == name.lexeme) {
                    return Err(KestrelError::parse_error(
                        name.span,
                        format!("Field '{}' given more than once", name.lexeme),
                    ));
                }
                self.consume_with_help(TokenType::Equal, "Expected '=' after field name", help.clone())?;
                let value = self.parse_expression()?;
                fields.push(FieldInit {
                    span: name.span.to(value.span()),
                    name: name.lexeme,
                    value,
                });
                if !self.match_types(&[TokenType::Comma]) {
                    break;
                }
            }
        }
        let paren = self.consume_with_help(TokenType::RightParen, "Expected ')' after field values", help)?;
        let span = start_span.to(&paren.span);

        Ok(Expr::DataConstruct {
            type_name,
            constructor,
            fields,
            span,
        })
    }

    fn match_types(&mut self, types: &[TokenType]) -> bool {
        for token_type in types {
            if self.check(token_type) {
                self.advance();
                return true;
            }
        }
        false
    }

    fn check(&self, token_type: &TokenType) -> bool {
        if self.is_at_end() {
            false
        } else {
            &self.peek().token_type == token_type
        }
    }

    fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    fn is_at_end(&self) -> bool {
        self.peek().token_type == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn error_span(&self) -> Span {
        if self.is_at_end() && self.current > 0 {
            // At EOF, point just past the last real token
            Span::single(self.tokens[self.current - 1].span.end)
        } else {
            self.peek().span.clone()
        }
    }

    fn error_at_current_with_help(&self, message: &str, help: &str) -> KestrelError {
        KestrelError::parse_error_with_help(self.error_span(), message.to_string(), help.to_string())
            .at(self.peek().position)
    }

    fn consume(&mut self, token_type: TokenType, message: &str) -> Result<&Token, KestrelError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(KestrelError::parse_error(self.error_span(), message.to_string()).at(self.peek().position))
        }
    }

    fn consume_with_help(&mut self, token_type: TokenType, message: &str, help: String) -> Result<&Token, KestrelError> {
        if self.check(&token_type) {
            Ok(self.advance())
        } else {
            Err(KestrelError::parse_error_with_help(self.error_span(), message.to_string(), help)
                .at(self.peek().position))
        }
    }
}

fn binary(left: Expr, operator: BinaryOp, right: Expr) -> Expr {
    let span = left.span().to(right.span());
    Expr::Binary {
        left: Box::new(left),
        operator,
        right: Box::new(right),
        span,
    }
}
