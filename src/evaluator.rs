use crate::ast::{AssignTarget, BinaryOp, ConstructorDecl, Expr, FieldInit, Program, TypeRef};
use crate::config::Config;
use crate::datatype::{DataConstructor, DataType, TypeTag, BUILTIN_KINDS};
use crate::environment::{Environment, FrameId};
use crate::error::{KestrelError, Span};
use crate::function::{Function, FunctionBody};
use crate::library;
use crate::output::OutputSink;
use crate::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Remaining stack below which a call switches to a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Tree-walking evaluator. Owns the frame arena; `println` output goes to `sink`.
pub struct Evaluator<'w> {
    environment: Environment,
    sink: &'w mut dyn OutputSink,
    config: Config,
    depth: usize,
}

impl<'w> Evaluator<'w> {
    pub fn new(sink: &'w mut dyn OutputSink, config: Config) -> Self {
        let mut environment = Environment::new();
        library::install(&mut environment);
        Self {
            environment,
            sink,
            config,
            depth: 0,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn into_environment(self) -> Environment {
        self.environment
    }

    /// Static checking pass run before evaluation. The language is dynamically
    /// typed, so every program is accepted.
    pub fn check_types(&mut self, _program: &Program) -> Result<(), KestrelError> {
        Ok(())
    }

    /// Evaluates each statement in the root frame and returns the value of the last one.
    pub fn evaluate_program(&mut self, program: &Program) -> Result<Option<Value>, KestrelError> {
        let root = self.environment.root();
        let mut last = None;

        for statement in &program.statements {
            last = Some(self.evaluate(statement, root)?);
            if self.config.collect_garbage {
                self.environment.collect_garbage();
            }
        }

        Ok(last)
    }

    /// Arms delegate to helpers so the recursion through `evaluate` keeps small frames.
    pub fn evaluate(&mut self, expr: &Expr, frame: FrameId) -> Result<Value, KestrelError> {
        match expr {
            Expr::Constant { value, .. } => Ok(value.clone()),
            Expr::Variable { name, span } => self.lookup(name, frame, span),
            Expr::Binary {
                left,
                operator,
                right,
                span,
            } => self.binary(left, *operator, right, frame, span),
            Expr::Assign { target, value, span } => self.assign(target, value, frame, span),
            Expr::IndexAssign {
                name,
                index,
                value,
                span,
            } => self.index_assign(name, index, value, frame, span),
            Expr::FieldAccess { object, field, span } => self.field_access(object, field, frame, span),
            Expr::Sequence {
                statements, result, ..
            } => self.sequence(statements, result, frame),
            Expr::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.conditional(condition, then_branch, else_branch, frame),
            Expr::FunctionDef {
                name, params, body, ..
            } => Ok(self.define_function(name, params, body, frame)),
            Expr::Lambda { params, body, .. } => Ok(self.closure(None, params, body, frame)),
            Expr::Call { callee, args, span } => self.call(callee, args, frame, span),
            Expr::DataTypeDecl {
                name,
                constructors,
                span,
            } => self.declare_type(name, constructors, span),
            Expr::DataConstruct {
                type_name,
                constructor,
                fields,
                span,
            } => self.construct(type_name, constructor.as_deref(), fields, frame, span),
            Expr::List { elements, .. } => self.list(elements, frame),
            Expr::Isa { expr, type_ref, span } => self.isa(expr, type_ref, frame, span),
        }
    }

    /// Writes one line of program output.
    pub fn write_line(&mut self, text: &str) {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        self.sink.write(&line);
    }

    /// Applies a function value to already-evaluated arguments. User code runs
    /// in a fresh child of the frame the function was defined in.
    pub fn call_function(&mut self, function: &Rc<Function>, args: Vec<Value>, span: &Span) -> Result<Value, KestrelError> {
        if args.len() != function.arity() {
            return Err(KestrelError::parse_error_with_help(
                span.clone(),
                format!(
                    "{} expects {} argument(s), got {}",
                    function.display_name(),
                    function.arity(),
                    args.len()
                ),
                format!("Parameters: ({})", function.params.join(", ")),
            ));
        }

        let body = match &function.body {
            FunctionBody::Builtin(builtin) => {
                tracing::trace!(builtin = builtin.name(), "calling builtin");
                return library::call(self, *builtin, args, span);
            }
            FunctionBody::User(body) => Rc::clone(body),
        };

        if self.depth >= self.config.max_call_depth {
            return Err(KestrelError::recursion_limit(span.clone(), self.config.max_call_depth));
        }

        tracing::trace!(function = function.display_name(), depth = self.depth, "calling function");
        let frame = self.environment.child(function.env);
        for (param, arg) in function.params.iter().zip(args) {
            self.environment.define(frame, param, arg, true);
        }

        self.depth += 1;
        let result = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.evaluate(&body, frame));
        self.depth -= 1;
        self.environment.release(frame);
        result
    }

    fn lookup(&self, name: &str, frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        if let Some(value) = self.environment.get_variable(frame, name) {
            return Ok(value);
        }

        // A named function used as a value, e.g. `map(double, xs)`
        match self.environment.function_arities(frame, name).as_slice() {
            [arity] => match self.environment.get_function(frame, name, *arity) {
                Some(function) => Ok(Value::Function(function)),
                None => Err(undefined(name, span)),
            },
            [] => Err(undefined(name, span)),
            arities => Err(KestrelError::context_error_with_help(
                span.clone(),
                format!("'{}' is ambiguous as a value", name),
                format!(
                    "'{}' is defined for {} arguments; wrap the one you mean in a lambda.",
                    name,
                    join_arities(arities)
                ),
            )),
        }
    }

    fn binary(
        &mut self,
        left: &Expr,
        operator: BinaryOp,
        right: &Expr,
        frame: FrameId,
        span: &Span,
    ) -> Result<Value, KestrelError> {
        // Both operands are evaluated, including for && and ||
        let left_value = self.evaluate(left, frame)?;
        let right_value = self.evaluate(right, frame)?;
        left_value.call_method(operator, &right_value, span)
    }

    fn assign(&mut self, target: &AssignTarget, value: &Expr, frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        match target {
            AssignTarget::Variable(name) => {
                let value = self.evaluate(value, frame)?;
                self.environment
                    .put_variable(frame, name, value.clone())
                    .map_err(|binding| {
                        KestrelError::context_error_with_help(
                            span.clone(),
                            format!("Cannot assign to '{}'", binding.0),
                            "Type names are bound when the type is declared and cannot be reassigned.".to_string(),
                        )
                    })?;
                Ok(value)
            }
            AssignTarget::Field { object, field } => {
                let instance = match self.evaluate(object, frame)? {
                    Value::Data(instance) => instance,
                    other => {
                        return Err(KestrelError::context_error(
                            span.clone(),
                            format!("Cannot set field '{}' on a value of type {}", field, other.type_name()),
                        ))
                    }
                };
                let value = self.evaluate(value, frame)?;
                if !instance.borrow_mut().set(field, value.clone()) {
                    let tag = instance.borrow().tag().clone();
                    return Err(no_such_field(&tag, field, span));
                }
                Ok(value)
            }
        }
    }

    fn index_assign(
        &mut self,
        name: &str,
        index: &Expr,
        value: &Expr,
        frame: FrameId,
        span: &Span,
    ) -> Result<Value, KestrelError> {
        let list = self
            .environment
            .get_variable(frame, name)
            .ok_or_else(|| undefined(name, span))?;
        let index = self.evaluate(index, frame)?;
        let value = self.evaluate(value, frame)?;
        let updated = list.with_replaced(&index, value, span)?;

        self.environment
            .put_variable(frame, name, updated.clone())
            .map_err(|binding| {
                KestrelError::context_error(span.clone(), format!("Cannot assign to '{}'", binding.0))
            })?;
        Ok(updated)
    }

    fn field_access(&mut self, object: &Expr, field: &str, frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        match self.evaluate(object, frame)? {
            Value::Data(instance) => {
                let instance = instance.borrow();
                let value = instance
                    .get(field)
                    .cloned()
                    .ok_or_else(|| no_such_field(instance.tag(), field, span));
                value
            }
            other => Err(KestrelError::context_error(
                span.clone(),
                format!("Cannot read field '{}' of a value of type {}", field, other.type_name()),
            )),
        }
    }

    fn sequence(&mut self, statements: &[Expr], result: &Expr, frame: FrameId) -> Result<Value, KestrelError> {
        let scope = self.environment.child(frame);
        let outcome = self.sequence_in(statements, result, scope);
        self.environment.release(scope);
        outcome
    }

    fn sequence_in(&mut self, statements: &[Expr], result: &Expr, scope: FrameId) -> Result<Value, KestrelError> {
        for statement in statements {
            self.evaluate(statement, scope)?;
        }
        self.evaluate(result, scope)
    }

    fn conditional(
        &mut self,
        condition: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
        frame: FrameId,
    ) -> Result<Value, KestrelError> {
        let branch = match self.evaluate(condition, frame)? {
            Value::Bool(true) => then_branch,
            Value::Bool(false) => else_branch,
            other => {
                return Err(KestrelError::mismatched_method(
                    condition.span().clone(),
                    "if",
                    other.type_name(),
                    "Bool",
                ))
            }
        };

        let scope = self.environment.child(frame);
        let outcome = self.evaluate(branch, scope);
        self.environment.release(scope);
        outcome
    }

    fn define_function(&mut self, name: &str, params: &[String], body: &Expr, frame: FrameId) -> Value {
        let value = self.closure(Some(name), params, body, frame);
        if let Value::Function(function) = &value {
            tracing::debug!(function = name, arity = function.arity(), "defined function");
            self.environment.put_function(frame, name, Rc::clone(function));
        }
        value
    }

    fn closure(&mut self, name: Option<&str>, params: &[String], body: &Expr, frame: FrameId) -> Value {
        self.environment.mark_captured(frame);
        Value::Function(Rc::new(Function {
            name: name.map(str::to_string),
            params: params.to_vec(),
            body: FunctionBody::User(Rc::new(body.clone())),
            env: frame,
        }))
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        let target = match callee {
            Expr::Variable { name, span: name_span } => self.resolve_callee(name, args.len(), frame, name_span)?,
            other => self.evaluate(other, frame)?,
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.evaluate(arg, frame)?);
        }

        match &target {
            Value::Function(function) => self.call_function(function, values, span),
            Value::List(_) if values.len() == 1 => target.index(&values[0], span),
            other => Err(KestrelError::mismatched_method(
                span.clone(),
                "()",
                other.type_name(),
                values.first().map_or("List", Value::type_name),
            )),
        }
    }

    /// A named callee is looked up among functions of matching arity first,
    /// then among variables (lambdas, lists).
    fn resolve_callee(&self, name: &str, argc: usize, frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        if let Some(function) = self.environment.get_function(frame, name, argc) {
            return Ok(Value::Function(function));
        }
        if let Some(value) = self.environment.get_variable(frame, name) {
            return Ok(value);
        }

        let arities = self.environment.function_arities(frame, name);
        if arities.is_empty() {
            return Err(undefined(name, span));
        }
        Err(KestrelError::parse_error_with_help(
            span.clone(),
            format!("No overload of '{}' takes {} argument(s)", name, argc),
            format!("'{}' is defined for {} arguments.", name, join_arities(&arities)),
        ))
    }

    fn declare_type(&mut self, name: &str, constructors: &[ConstructorDecl], span: &Span) -> Result<Value, KestrelError> {
        let data_type = DataType {
            name: name.to_string(),
            constructors: constructors
                .iter()
                .map(|decl| {
                    Rc::new(DataConstructor {
                        tag: TypeTag {
                            type_name: name.to_string(),
                            constructor: decl.name.clone(),
                        },
                        fields: decl.fields.clone(),
                    })
                })
                .collect(),
        };

        let data_type = self.environment.register_type(data_type).ok_or_else(|| {
            KestrelError::parse_error(span.clone(), format!("Type '{}' is already declared", name))
        })?;
        tracing::debug!(type_name = name, constructors = data_type.constructors.len(), "registered type");

        let value = Value::Type(data_type.tag());
        let root = self.environment.root();
        self.environment.define(root, name, value.clone(), false);
        Ok(value)
    }

    fn construct(
        &mut self,
        type_name: &str,
        constructor: Option<&str>,
        fields: &[FieldInit],
        frame: FrameId,
        span: &Span,
    ) -> Result<Value, KestrelError> {
        let data_type = self.environment.get_type(type_name).ok_or_else(|| unknown_type(type_name, span))?;
        let data_constructor = match data_type.constructor(constructor) {
            Some(data_constructor) => Rc::clone(data_constructor),
            None => return Err(unknown_constructor(&data_type, constructor, span)),
        };

        let mut values = HashMap::with_capacity(fields.len());
        for field in fields {
            values.insert(field.name.clone(), self.evaluate(&field.value, frame)?);
        }

        let instance = data_constructor
            .instantiate(values)
            .map_err(|message| KestrelError::parse_error(span.clone(), message))?;
        Ok(Value::Data(Rc::new(RefCell::new(instance))))
    }

    fn list(&mut self, elements: &[Expr], frame: FrameId) -> Result<Value, KestrelError> {
        let mut values = Vec::with_capacity(elements.len());
        for element in elements {
            values.push(self.evaluate(element, frame)?);
        }
        Ok(Value::list(values))
    }

    fn isa(&mut self, expr: &Expr, type_ref: &TypeRef, frame: FrameId, span: &Span) -> Result<Value, KestrelError> {
        let value = self.evaluate(expr, frame)?;

        if BUILTIN_KINDS.contains(&type_ref.type_name.as_str()) {
            if type_ref.constructor.is_some() {
                return Err(KestrelError::context_error(
                    span.clone(),
                    format!("Built-in type {} has no constructors", type_ref.type_name),
                ));
            }
            return Ok(Value::Bool(value.type_name() == type_ref.type_name));
        }

        let data_type = self
            .environment
            .get_type(&type_ref.type_name)
            .ok_or_else(|| unknown_type(&type_ref.type_name, span))?;
        if let Some(constructor) = &type_ref.constructor {
            if data_type.constructor(Some(constructor.as_str())).is_none() {
                return Err(unknown_constructor(&data_type, Some(constructor.as_str()), span));
            }
        }

        let matches = match &value {
            Value::Data(instance) => instance.borrow().tag().matches(type_ref),
            _ => false,
        };
        Ok(Value::Bool(matches))
    }
}

fn undefined(name: &str, span: &Span) -> KestrelError {
    KestrelError::context_error(span.clone(), format!("Undefined name '{}'", name))
}

fn unknown_type(name: &str, span: &Span) -> KestrelError {
    KestrelError::context_error_with_help(
        span.clone(),
        format!("Unknown type '{}'", name),
        "Declare it first, e.g. datatype Point = {x, y};".to_string(),
    )
}

/// A named type used without a constructor, or a constructor the type lacks.
fn unknown_constructor(data_type: &DataType, constructor: Option<&str>, span: &Span) -> KestrelError {
    let names: Vec<String> = data_type
        .constructors
        .iter()
        .map(|c| c.tag.to_string())
        .collect();
    match constructor {
        None => KestrelError::parse_error_with_help(
            span.clone(),
            format!("Type '{}' must be constructed through a named constructor", data_type.name),
            format!("Available constructors: {}", names.join(", ")),
        ),
        Some(constructor) => KestrelError::context_error_with_help(
            span.clone(),
            format!("Type '{}' has no constructor '{}'", data_type.name, constructor),
            format!("Available constructors: {}", names.join(", ")),
        ),
    }
}

fn no_such_field(tag: &TypeTag, field: &str, span: &Span) -> KestrelError {
    KestrelError::context_error(span.clone(), format!("{} has no field '{}'", tag, field))
}

fn join_arities(arities: &[usize]) -> String {
    arities
        .iter()
        .map(usize::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}
