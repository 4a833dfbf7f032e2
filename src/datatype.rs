use crate::ast::TypeRef;
use crate::value::Value;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Kind names usable on the right of `isa` without a declaration.
pub const BUILTIN_KINDS: &[&str] = &["Num", "Bool", "Char", "List", "Func", "Type"];

/// Identifies the constructor that produced an instance. The pair is kept
/// explicitly instead of being packed into a `Type$Sub` string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub type_name: String,
    pub constructor: Option<String>,
}

impl TypeTag {
    pub fn kind(name: &str) -> Self {
        Self {
            type_name: name.to_string(),
            constructor: None,
        }
    }

    /// `Type` matches every constructor of `Type`; `Type$Sub` matches only `Sub`.
    pub fn matches(&self, type_ref: &TypeRef) -> bool {
        self.type_name == type_ref.type_name
            && match &type_ref.constructor {
                Some(constructor) => self.constructor.as_deref() == Some(constructor.as_str()),
                None => true,
            }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.constructor {
            Some(constructor) => write!(f, "{}${}", self.type_name, constructor),
            None => write!(f, "{}", self.type_name),
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct DataConstructor {
    pub tag: TypeTag,
    pub fields: Vec<String>,
}

impl DataConstructor {
    /// Builds an instance, requiring the supplied fields to be exactly the
    /// declared set.
    pub fn instantiate(
        self: &Rc<Self>,
        fields: HashMap<String, Value>,
    ) -> Result<DataInstance, String> {
        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| !fields.contains_key(*field))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "Missing field(s) {} for constructor {}",
                missing.join(", "),
                self.tag
            ));
        }

        let mut extra: Vec<&str> = fields
            .keys()
            .filter(|field| !self.fields.contains(field))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            extra.sort_unstable();
            return Err(format!(
                "Unknown field(s) {} for constructor {}",
                extra.join(", "),
                self.tag
            ));
        }

        Ok(DataInstance {
            constructor: Rc::clone(self),
            fields,
        })
    }
}

#[derive(Debug)]
pub struct DataType {
    pub name: String,
    pub constructors: Vec<Rc<DataConstructor>>,
}

impl DataType {
    /// `None` selects the anonymous constructor of `datatype T = {..}`.
    pub fn constructor(&self, name: Option<&str>) -> Option<&Rc<DataConstructor>> {
        self.constructors
            .iter()
            .find(|constructor| constructor.tag.constructor.as_deref() == name)
    }

    pub fn tag(&self) -> TypeTag {
        TypeTag::kind(&self.name)
    }
}

#[derive(Debug)]
pub struct DataInstance {
    constructor: Rc<DataConstructor>,
    fields: HashMap<String, Value>,
}

impl DataInstance {
    pub fn tag(&self) -> &TypeTag {
        &self.constructor.tag
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Replaces an existing field; returns `false` for an undeclared one.
    pub fn set(&mut self, field: &str, value: Value) -> bool {
        match self.fields.get_mut(field) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.values()
    }
}

impl PartialEq for DataInstance {
    fn eq(&self, other: &Self) -> bool {
        self.constructor.tag == other.constructor.tag && self.fields == other.fields
    }
}

impl fmt::Display for DataInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{{", self.constructor.tag)?;
        for (i, name) in self.constructor.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match self.fields.get(name) {
                Some(value) => write!(f, "{} = {}", name, value)?,
                None => write!(f, "{} = ?", name)?,
            }
        }
        write!(f, "}}")
    }
}
