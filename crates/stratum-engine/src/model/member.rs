//! Body members of a declared type
//!
//! Members are immutable once declared. A live update never edits a member
//! in place: it declares a new type node and diffs the two bodies.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use stratum_sdk::{InstanceHandle, Value};

use crate::model::node::TypeId;
use crate::model::ty::TypeRef;
use crate::system::TypeSystem;

bitflags! {
    /// Kinds of member a lookup may match
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberKinds: u16 {
        /// Declared field
        const FIELD = 1 << 0;
        /// Method, matched by exact name
        const METHOD = 1 << 1;
        /// Getter for the property name (`getX` / `isX`)
        const GET_METHOD = 1 << 2;
        /// Setter for the property name (`setX`)
        const SET_METHOD = 1 << 3;
        /// Inner object type (an instance-valued property)
        const OBJECT = 1 << 4;
        /// Inner non-object type
        const TYPE = 1 << 5;
        /// Property assignment overriding an inherited initializer
        const ASSIGNMENT = 1 << 6;
        /// Anything readable as a property
        const PROPERTY = Self::FIELD.bits()
            | Self::GET_METHOD.bits()
            | Self::SET_METHOD.bits()
            | Self::OBJECT.bits();
    }
}

/// Member visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// Visible everywhere
    #[default]
    Public,
    /// Visible to the declaring type and its sub-types
    Protected,
    /// Visible to the declaring type (and its inner types)
    Private,
    /// Visible within the declaring package
    Package,
}

/// Declaration modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// Visibility
    pub access: Access,
    /// Class-level rather than per instance
    pub is_static: bool,
}

/// A method or constructor parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// Parameter type
    pub ty: TypeRef,
}

impl Param {
    /// Create a parameter
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Native initializer body
pub type InitFn = Arc<dyn Fn(&EvalScope<'_>) -> Result<Value, String> + Send + Sync>;

/// Field or property-assignment initializer.
///
/// Two initializers are the same when their source text is the same; that
/// is what the update engine compares when classifying a field.
#[derive(Clone)]
pub enum Initializer {
    /// Constant value
    Literal(Value),
    /// Copy of another property of the same instance (or type, for statics)
    Property(String),
    /// New instance of the named type
    New(String),
    /// Arbitrary code, identified by its source text
    Expr {
        /// Source text of the expression
        source: String,
        /// Evaluator
        eval: InitFn,
    },
}

impl Initializer {
    /// Constant initializer
    pub fn literal(value: impl Into<Value>) -> Self {
        Initializer::Literal(value.into())
    }

    /// Copy another property
    pub fn property(name: impl Into<String>) -> Self {
        Initializer::Property(name.into())
    }

    /// Construct a new instance of `type_name`
    pub fn new_object(type_name: impl Into<String>) -> Self {
        Initializer::New(type_name.into())
    }

    /// Arbitrary code
    pub fn expr<F>(source: impl Into<String>, eval: F) -> Self
    where
        F: Fn(&EvalScope<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Initializer::Expr {
            source: source.into(),
            eval: Arc::new(eval),
        }
    }

    /// Source text used for change detection
    pub fn source_text(&self) -> String {
        match self {
            Initializer::Literal(Value::Str(s)) => format!("{:?}", s),
            Initializer::Literal(v) => v.to_string(),
            Initializer::Property(name) => name.clone(),
            Initializer::New(type_name) => format!("new {}()", type_name),
            Initializer::Expr { source, .. } => source.clone(),
        }
    }

    /// Evaluate against a scope. Runs user code; never call under the
    /// structural lock.
    pub fn evaluate(&self, scope: &EvalScope<'_>) -> Result<Value, String> {
        match self {
            Initializer::Literal(v) => Ok(v.clone()),
            Initializer::Property(name) => scope.get(name),
            Initializer::New(type_name) => {
                let id = scope
                    .system
                    .find_type(type_name)
                    .ok_or_else(|| format!("unknown type {}", type_name))?;
                let instance = scope
                    .system
                    .create_instance(id, &[])
                    .map_err(|e| e.to_string())?;
                Ok(Value::Object(instance))
            }
            Initializer::Expr { eval, .. } => eval(scope),
        }
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Initializer({})", self.source_text())
    }
}

impl PartialEq for Initializer {
    fn eq(&self, other: &Self) -> bool {
        self.source_text() == other.source_text()
    }
}

/// Evaluation scope handed to initializers
pub struct EvalScope<'a> {
    pub(crate) system: &'a TypeSystem,
    pub(crate) type_id: TypeId,
    pub(crate) instance: Option<&'a InstanceHandle>,
}

impl<'a> EvalScope<'a> {
    /// The session the initializer runs in
    pub fn system(&self) -> &TypeSystem {
        self.system
    }

    /// Type declaring the initializer
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Instance being initialized (None for static initializers)
    pub fn instance(&self) -> Option<&InstanceHandle> {
        self.instance
    }

    /// Read a property of the instance, or a static property of the type
    pub fn get(&self, name: &str) -> Result<Value, String> {
        match self.instance {
            Some(instance) => self.system.get_property(instance, name),
            None => self.system.get_static(self.type_id, name),
        }
        .map_err(|e| e.to_string())
    }
}

/// Field declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: TypeRef,
    /// Initializer, if any
    pub init: Option<Initializer>,
    /// Modifiers
    pub modifiers: Modifiers,
}

impl FieldDecl {
    /// Create a public instance field without initializer
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            init: None,
            modifiers: Modifiers::default(),
        }
    }

    /// Set the initializer
    pub fn init(mut self, init: Initializer) -> Self {
        self.init = Some(init);
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    /// Set visibility
    pub fn access(mut self, access: Access) -> Self {
        self.modifiers.access = access;
        self
    }
}

/// Role of a method under the accessor naming conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorRole {
    /// `getX()` / `isX()`
    Getter,
    /// `setX(v)`
    Setter,
    /// `validateX(..)`
    Validator,
}

/// Method declaration
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    /// Method name
    pub name: String,
    /// Parameters
    pub params: Vec<Param>,
    /// Return type
    pub ret: TypeRef,
    /// Modifiers
    pub modifiers: Modifiers,
    /// Body source text (compared by the update engine)
    pub body: String,
}

impl MethodDecl {
    /// Create a public instance method with no parameters
    pub fn new(name: impl Into<String>, ret: TypeRef) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            ret,
            modifiers: Modifiers::default(),
            body: String::new(),
        }
    }

    /// Add a parameter
    pub fn param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    /// Set the body source
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Mark as static
    pub fn as_static(mut self) -> Self {
        self.modifiers.is_static = true;
        self
    }

    /// Set visibility
    pub fn access(mut self, access: Access) -> Self {
        self.modifiers.access = access;
        self
    }

    /// `name(T1,T2)` - identifies an overload
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.params.iter().map(|p| p.ty.to_string()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Classify the method under the get/set/is/validate conventions
    pub fn accessor_property(&self) -> Option<(AccessorRole, String)> {
        let arity = self.params.len();
        if let Some(rest) = self.name.strip_prefix("get") {
            if arity == 0 && !self.ret.is_void() {
                return decapitalize(rest).map(|p| (AccessorRole::Getter, p));
            }
        } else if let Some(rest) = self.name.strip_prefix("is") {
            if arity == 0 && self.ret == TypeRef::Bool {
                return decapitalize(rest).map(|p| (AccessorRole::Getter, p));
            }
        } else if let Some(rest) = self.name.strip_prefix("set") {
            if arity == 1 {
                return decapitalize(rest).map(|p| (AccessorRole::Setter, p));
            }
        } else if let Some(rest) = self.name.strip_prefix("validate") {
            return decapitalize(rest).map(|p| (AccessorRole::Validator, p));
        }
        None
    }
}

/// `Count` -> `count`; None unless `rest` starts with an uppercase letter
fn decapitalize(rest: &str) -> Option<String> {
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }
    Some(first.to_lowercase().chain(chars).collect())
}

/// Constructor declaration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstructorDecl {
    /// Parameters
    pub params: Vec<Param>,
    /// Field name <- parameter index bindings applied after initializers
    pub binds: Vec<(String, usize)>,
    /// Visibility
    pub access: Access,
}

impl ConstructorDecl {
    /// Create a no-arg public constructor
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter
    pub fn param(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    /// Store parameter `index` into property `field`
    pub fn bind(mut self, field: impl Into<String>, index: usize) -> Self {
        self.binds.push((field.into(), index));
        self
    }
}

/// Property assignment (`name = init;` in a body)
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAssign {
    /// Property assigned
    pub name: String,
    /// New initializer
    pub init: Initializer,
}

/// Initializer block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDecl {
    /// Runs once per type rather than per instance
    pub is_static: bool,
    /// Block source text
    pub source: String,
}

/// Reference from a body to an inner type node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerTypeRef {
    /// Simple name
    pub name: String,
    /// Arena handle of the inner type
    pub id: TypeId,
    /// Inner object (instance-valued property) rather than a plain type
    pub is_object: bool,
    /// Static inner type
    pub is_static: bool,
}

/// A body member
#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    /// Field
    Field(FieldDecl),
    /// Method
    Method(MethodDecl),
    /// Constructor
    Constructor(ConstructorDecl),
    /// Inner type
    InnerType(InnerTypeRef),
    /// Property assignment
    Assign(PropertyAssign),
    /// Initializer block
    Block(BlockDecl),
}

impl Member {
    /// Simple name (None for constructors and blocks)
    pub fn name(&self) -> Option<&str> {
        match self {
            Member::Field(f) => Some(&f.name),
            Member::Method(m) => Some(&m.name),
            Member::InnerType(t) => Some(&t.name),
            Member::Assign(a) => Some(&a.name),
            Member::Constructor(_) | Member::Block(_) => None,
        }
    }

    /// Declared kind
    pub fn kind(&self) -> MemberKinds {
        match self {
            Member::Field(_) => MemberKinds::FIELD,
            Member::Method(_) => MemberKinds::METHOD,
            Member::InnerType(t) if t.is_object => MemberKinds::OBJECT,
            Member::InnerType(_) => MemberKinds::TYPE,
            Member::Assign(_) => MemberKinds::ASSIGNMENT,
            Member::Constructor(_) | Member::Block(_) => MemberKinds::empty(),
        }
    }

    /// Check if the member is class-level
    pub fn is_static(&self) -> bool {
        match self {
            Member::Field(f) => f.modifiers.is_static,
            Member::Method(m) => m.modifiers.is_static,
            Member::InnerType(t) => t.is_static,
            Member::Block(b) => b.is_static,
            Member::Constructor(_) | Member::Assign(_) => false,
        }
    }

    /// Visibility
    pub fn access(&self) -> Access {
        match self {
            Member::Field(f) => f.modifiers.access,
            Member::Method(m) => m.modifiers.access,
            Member::Constructor(c) => c.access,
            _ => Access::Public,
        }
    }

    /// Field or inner type: occupies the property namespace
    pub fn is_property_like(&self) -> bool {
        matches!(self, Member::Field(_) | Member::InnerType(_))
    }

    /// Get as field
    pub fn as_field(&self) -> Option<&FieldDecl> {
        match self {
            Member::Field(f) => Some(f),
            _ => None,
        }
    }

    /// Get as method
    pub fn as_method(&self) -> Option<&MethodDecl> {
        match self {
            Member::Method(m) => Some(m),
            _ => None,
        }
    }

    /// Get as inner type reference
    pub fn as_inner(&self) -> Option<&InnerTypeRef> {
        match self {
            Member::InnerType(t) => Some(t),
            _ => None,
        }
    }
}
