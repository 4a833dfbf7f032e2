use crate::ast::BinaryOp;
use crate::datatype::{DataInstance, TypeTag};
use crate::error::{KestrelError, Span};
use crate::function::Function;
use crate::number::Number;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Value {
    Num(Number),
    Bool(bool),
    Char(char),
    /// Lists are immutable; index assignment rebinds a modified copy.
    List(Rc<Vec<Value>>),
    Function(Rc<Function>),
    /// Instances are shared so that `obj.field = v` is visible through every alias.
    Data(Rc<RefCell<DataInstance>>),
    Type(TypeTag),
}

impl Value {
    pub fn number(value: i64) -> Value {
        Value::Num(Number::from(value))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    /// Strings are lists of characters.
    pub fn string(text: &str) -> Value {
        Value::list(text.chars().map(Value::Char).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Num(_) => "Num",
            Value::Bool(_) => "Bool",
            Value::Char(_) => "Char",
            Value::List(_) => "List",
            Value::Function(_) => "Func",
            Value::Data(_) => "Data",
            Value::Type(_) => "Type",
        }
    }

    /// The tag reported by `typeOf`: the constructor tag for instances,
    /// the kind name for everything else.
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Data(instance) => instance.borrow().tag().clone(),
            other => TypeTag::kind(other.type_name()),
        }
    }

    /// Dispatches a binary operator on the receiver's kind. Equality is
    /// structural across every kind; everything else is defined per kind pair.
    pub fn call_method(&self, operator: BinaryOp, other: &Value, span: &Span) -> Result<Value, KestrelError> {
        match operator {
            BinaryOp::Equal => return Ok(Value::Bool(self == other)),
            BinaryOp::NotEqual => return Ok(Value::Bool(self != other)),
            _ => {}
        }

        match (self, other) {
            (Value::Num(l), Value::Num(r)) => num_method(operator, l, r, span),
            (Value::Num(l), Value::Char(r)) if operator == BinaryOp::Add => {
                char_arithmetic(operator, *r as i64, l, "Num", span)
            }
            (Value::Char(l), Value::Char(r)) => match operator {
                BinaryOp::Less => Ok(Value::Bool(l < r)),
                BinaryOp::LessEqual => Ok(Value::Bool(l <= r)),
                BinaryOp::Greater => Ok(Value::Bool(l > r)),
                BinaryOp::GreaterEqual => Ok(Value::Bool(l >= r)),
                _ => char_arithmetic(operator, *l as i64, &Number::from(*r as i64), "Char", span),
            },
            (Value::Char(l), Value::Num(r)) => char_arithmetic(operator, *l as i64, r, "Num", span),
            (Value::Bool(l), Value::Bool(r)) => match operator {
                BinaryOp::And => Ok(Value::Bool(*l && *r)),
                BinaryOp::Or => Ok(Value::Bool(*l || *r)),
                _ => Err(self.mismatch(operator, other, span)),
            },
            (Value::List(l), Value::List(r)) if operator == BinaryOp::Add => {
                let mut joined = Vec::with_capacity(l.len() + r.len());
                joined.extend(l.iter().cloned());
                joined.extend(r.iter().cloned());
                Ok(Value::list(joined))
            }
            _ => Err(self.mismatch(operator, other, span)),
        }
    }

    fn mismatch(&self, operator: BinaryOp, other: &Value, span: &Span) -> KestrelError {
        KestrelError::mismatched_method(span.clone(), operator.symbol(), self.type_name(), other.type_name())
    }

    /// `list(i)`: zero-based element access.
    pub fn index(&self, index: &Value, span: &Span) -> Result<Value, KestrelError> {
        let items = match self {
            Value::List(items) => items,
            _ => {
                return Err(KestrelError::mismatched_method(
                    span.clone(),
                    "()",
                    self.type_name(),
                    index.type_name(),
                ))
            }
        };
        let position = list_position(index, items.len(), span)?;
        Ok(items[position].clone())
    }

    /// Copy of the list with one element replaced.
    pub fn with_replaced(&self, index: &Value, value: Value, span: &Span) -> Result<Value, KestrelError> {
        let items = match self {
            Value::List(items) => items,
            _ => {
                return Err(KestrelError::mismatched_method(
                    span.clone(),
                    "{}=",
                    self.type_name(),
                    index.type_name(),
                ))
            }
        };
        let position = list_position(index, items.len(), span)?;
        let mut replaced = items.as_ref().clone();
        replaced[position] = value;
        Ok(Value::list(replaced))
    }
}

fn list_position(index: &Value, len: usize, span: &Span) -> Result<usize, KestrelError> {
    let number = match index {
        Value::Num(number) => number,
        other => {
            return Err(KestrelError::index_error(
                span.clone(),
                format!("List index must be a number, got {}", other.type_name()),
            ))
        }
    };
    match number.to_i64() {
        Some(i) if i >= 0 && (i as usize) < len => Ok(i as usize),
        _ => Err(KestrelError::index_error(
            span.clone(),
            format!("Index {} out of range for list of length {}", number, len),
        )),
    }
}

fn num_method(operator: BinaryOp, l: &Number, r: &Number, span: &Span) -> Result<Value, KestrelError> {
    let result = match operator {
        BinaryOp::Add => Value::Num(l.add(r)),
        BinaryOp::Subtract => Value::Num(l.sub(r)),
        BinaryOp::Multiply => Value::Num(l.mul(r)),
        BinaryOp::Divide => match l.checked_div(r) {
            Some(quotient) => Value::Num(quotient),
            None => {
                return Err(KestrelError::arithmetic_error(
                    span.clone(),
                    "Division by zero".to_string(),
                ))
            }
        },
        BinaryOp::Power => Value::Num(
            l.pow(r)
                .map_err(|message| KestrelError::arithmetic_error(span.clone(), message))?,
        ),
        BinaryOp::Less => Value::Bool(l < r),
        BinaryOp::LessEqual => Value::Bool(l <= r),
        BinaryOp::Greater => Value::Bool(l > r),
        BinaryOp::GreaterEqual => Value::Bool(l >= r),
        _ => {
            return Err(KestrelError::mismatched_method(
                span.clone(),
                operator.symbol(),
                "Num",
                "Num",
            ))
        }
    };
    Ok(result)
}

/// Arithmetic on character ordinals; the result is always a `Char`.
fn char_arithmetic(
    operator: BinaryOp,
    ordinal: i64,
    other: &Number,
    other_kind: &'static str,
    span: &Span,
) -> Result<Value, KestrelError> {
    let ordinal = Number::from(ordinal);
    let result = match operator {
        BinaryOp::Add => ordinal.add(other),
        BinaryOp::Subtract => ordinal.sub(other),
        BinaryOp::Multiply => ordinal.mul(other),
        BinaryOp::Divide => ordinal.checked_div(other).ok_or_else(|| {
            KestrelError::arithmetic_error(span.clone(), "Division by zero".to_string())
        })?,
        _ => {
            return Err(KestrelError::mismatched_method(
                span.clone(),
                operator.symbol(),
                "Char",
                other_kind,
            ))
        }
    };

    result
        .to_i64()
        .and_then(|code| u32::try_from(code).ok())
        .and_then(char::from_u32)
        .map(Value::Char)
        .ok_or_else(|| {
            KestrelError::arithmetic_error(
                span.clone(),
                format!("{} is not a valid character code", result),
            )
        })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Num(l), Value::Num(r)) => l == r,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Char(l), Value::Char(r)) => l == r,
            (Value::List(l), Value::List(r)) => l == r,
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            (Value::Data(l), Value::Data(r)) => Rc::ptr_eq(l, r) || *l.borrow() == *r.borrow(),
            (Value::Type(l), Value::Type(r)) => l == r,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => write!(f, "{}", c),
            Value::List(items) => {
                // A non-empty list of characters reads as text
                if !items.is_empty() && items.iter().all(|item| matches!(item, Value::Char(_))) {
                    for item in items.iter() {
                        write!(f, "{}", item)?;
                    }
                    return Ok(());
                }
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match item {
                        Value::Char(c) => write!(f, "'{}'", c)?,
                        other => write!(f, "{}", other)?,
                    }
                }
                write!(f, "]")
            }
            Value::Function(function) => write!(f, "{}", function),
            Value::Data(instance) => write!(f, "{}", instance.borrow()),
            Value::Type(tag) => write!(f, "<type {}>", tag),
        }
    }
}
