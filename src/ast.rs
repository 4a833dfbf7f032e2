use crate::error::Span;
use crate::value::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Expr>,
}

/// Every construct of the language, statements included, is an expression
/// node that evaluates to a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant {
        value: Value,
        span: Span,
    },
    Variable {
        name: String,
        span: Span,
    },
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
        span: Span,
    },
    /// `name = value` declares or mutates; `obj.field = value` only mutates.
    Assign {
        target: AssignTarget,
        value: Box<Expr>,
        span: Span,
    },
    /// `name{index} = value`
    IndexAssign {
        name: String,
        index: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    FieldAccess {
        object: Box<Expr>,
        field: String,
        span: Span,
    },
    Sequence {
        statements: Vec<Expr>,
        result: Box<Expr>,
        span: Span,
    },
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
        span: Span,
    },
    FunctionDef {
        name: String,
        params: Vec<String>,
        body: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
        span: Span,
    },
    DataTypeDecl {
        name: String,
        constructors: Vec<ConstructorDecl>,
        span: Span,
    },
    DataConstruct {
        type_name: String,
        constructor: Option<String>,
        fields: Vec<FieldInit>,
        span: Span,
    },
    List {
        elements: Vec<Expr>,
        span: Span,
    },
    Isa {
        expr: Box<Expr>,
        type_ref: TypeRef,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Constant { span, .. } => span,
            Expr::Variable { span, .. } => span,
            Expr::Binary { span, .. } => span,
            Expr::Assign { span, .. } => span,
            Expr::IndexAssign { span, .. } => span,
            Expr::FieldAccess { span, .. } => span,
            Expr::Sequence { span, .. } => span,
            Expr::If { span, .. } => span,
            Expr::FunctionDef { span, .. } => span,
            Expr::Call { span, .. } => span,
            Expr::Lambda { span, .. } => span,
            Expr::DataTypeDecl { span, .. } => span,
            Expr::DataConstruct { span, .. } => span,
            Expr::List { span, .. } => span,
            Expr::Isa { span, .. } => span,
        }
    }

    /// Whether the node ends with a closing brace, which lets a top-level
    /// statement omit its `;`.
    pub fn is_block(&self) -> bool {
        matches!(self, Expr::Sequence { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Variable(String),
    Field { object: Box<Expr>, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstructorDecl {
    /// `None` for the single anonymous constructor of `datatype T = {..}`.
    pub name: Option<String>,
    pub fields: Vec<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInit {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// Right-hand side of `isa`: `Type` or `Type$Constructor`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub type_name: String,
    pub constructor: Option<String>,
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.constructor {
            Some(constructor) => write!(f, "{}${}", self.type_name, constructor),
            None => write!(f, "{}", self.type_name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "^",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}
