use crate::ast::Expr;
use crate::environment::FrameId;
use crate::library::Builtin;
use std::fmt;
use std::rc::Rc;

#[derive(Debug)]
pub enum FunctionBody {
    User(Rc<Expr>),
    Builtin(Builtin),
}

/// A closure: parameters and body together with the frame that was active
/// where it was defined. Calls run in a fresh child of `env`.
#[derive(Debug)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: FunctionBody,
    pub env: FrameId,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("lambda")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.body {
            FunctionBody::Builtin(_) => write!(f, "<builtin {}/{}>", self.display_name(), self.arity()),
            FunctionBody::User(_) => write!(f, "<func {}/{}>", self.display_name(), self.arity()),
        }
    }
}
