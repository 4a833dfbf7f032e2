use crate::environment::Environment;
use crate::error::{KestrelError, Span};
use crate::evaluator::Evaluator;
use crate::function::{Function, FunctionBody};
use crate::value::Value;
use std::rc::Rc;

/// Functions pre-bound in the root frame of every interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Println,
    Map,
    Foldl,
    Foreach,
    Length,
    In,
    ToString,
    TypeOf,
}

impl Builtin {
    pub const ALL: [Builtin; 8] = [
        Builtin::Println,
        Builtin::Map,
        Builtin::Foldl,
        Builtin::Foreach,
        Builtin::Length,
        Builtin::In,
        Builtin::ToString,
        Builtin::TypeOf,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Println => "println",
            Builtin::Map => "map",
            Builtin::Foldl => "foldl",
            Builtin::Foreach => "foreach",
            Builtin::Length => "length",
            Builtin::In => "in",
            Builtin::ToString => "toString",
            Builtin::TypeOf => "typeOf",
        }
    }

    fn params(self) -> &'static [&'static str] {
        match self {
            Builtin::Println => &["value"],
            Builtin::Map => &["f", "list"],
            Builtin::Foldl => &["f", "initial", "list"],
            Builtin::Foreach => &["f", "list"],
            Builtin::Length => &["list"],
            Builtin::In => &["item", "list"],
            Builtin::ToString => &["value"],
            Builtin::TypeOf => &["value"],
        }
    }
}

pub fn install(environment: &mut Environment) {
    let root = environment.root();
    for builtin in Builtin::ALL {
        let function = Function {
            name: Some(builtin.name().to_string()),
            params: builtin.params().iter().map(|p| p.to_string()).collect(),
            body: FunctionBody::Builtin(builtin),
            env: root,
        };
        environment.put_function(root, builtin.name(), Rc::new(function));
    }
}

/// Runs a builtin. Arity has already been checked by the caller.
pub fn call(
    evaluator: &mut Evaluator,
    builtin: Builtin,
    mut args: Vec<Value>,
    span: &Span,
) -> Result<Value, KestrelError> {
    match builtin {
        Builtin::Println => {
            let value = args.remove(0);
            evaluator.write_line(&value.to_string());
            Ok(value)
        }
        Builtin::Map => {
            let function = expect_function(builtin, &args[0], span)?;
            let items = expect_list(builtin, &args[1], span)?;
            let mut mapped = Vec::with_capacity(items.len());
            for item in items.iter() {
                mapped.push(evaluator.call_function(&function, vec![item.clone()], span)?);
            }
            Ok(Value::list(mapped))
        }
        Builtin::Foldl => {
            let function = expect_function(builtin, &args[0], span)?;
            let items = expect_list(builtin, &args[2], span)?;
            let mut accumulator = args.swap_remove(1);
            for item in items.iter() {
                accumulator = evaluator.call_function(&function, vec![accumulator, item.clone()], span)?;
            }
            Ok(accumulator)
        }
        Builtin::Foreach => {
            let function = expect_function(builtin, &args[0], span)?;
            let items = expect_list(builtin, &args[1], span)?;
            for item in items.iter() {
                evaluator.call_function(&function, vec![item.clone()], span)?;
            }
            Ok(Value::List(items))
        }
        Builtin::Length => {
            let items = expect_list(builtin, &args[0], span)?;
            Ok(Value::number(items.len() as i64))
        }
        Builtin::In => {
            let items = expect_list(builtin, &args[1], span)?;
            Ok(Value::Bool(items.contains(&args[0])))
        }
        Builtin::ToString => Ok(Value::string(&args[0].to_string())),
        Builtin::TypeOf => Ok(Value::Type(args[0].type_tag())),
    }
}

fn expect_function(builtin: Builtin, value: &Value, span: &Span) -> Result<Rc<Function>, KestrelError> {
    match value {
        Value::Function(function) => Ok(Rc::clone(function)),
        other => Err(KestrelError::mismatched_method(
            span.clone(),
            builtin.name(),
            other.type_name(),
            "Func",
        )),
    }
}

fn expect_list(builtin: Builtin, value: &Value, span: &Span) -> Result<Rc<Vec<Value>>, KestrelError> {
    match value {
        Value::List(items) => Ok(Rc::clone(items)),
        other => Err(KestrelError::mismatched_method(
            span.clone(),
            builtin.name(),
            other.type_name(),
            "List",
        )),
    }
}
