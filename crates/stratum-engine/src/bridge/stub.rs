//! Stub source rendering and content hashing

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use super::CompiledAncestor;
use crate::error::{EngineError, EngineResult};
use crate::model::{MethodDecl, TypeId, TypeRef};
use crate::slots::SlotPosition;
use crate::system::TypeSystem;

/// Hex-encoded SHA-256 of stub content
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Render the forwarding stub of `id`. `inner_stubs` are the qualified
/// names of inner types whose stubs were produced first.
pub(super) fn render(system: &TypeSystem, id: TypeId, inner_stubs: &[String]) -> EngineResult<String> {
    let node = system
        .node(id)
        .ok_or_else(|| EngineError::TypeNotFound(id.to_string()))?;
    let suffix = &system.options().stub_suffix;
    let stub_name = format!("{}{}", node.name, suffix);

    let (ancestor, constructors) = match system.compiled_ancestor(id) {
        CompiledAncestor::Found(name, Some(class)) => (Some(name), class.constructors),
        CompiledAncestor::Found(name, None) => (Some(name), vec![Vec::new()]),
        CompiledAncestor::None => (None, vec![Vec::new()]),
    };

    let mut out = String::new();
    out.push_str(&format!("// Forwarding stub for {}\n", node.qualified_name));
    if let Some(ancestor) = &ancestor {
        out.push_str(&format!("// Compiled ancestor: {}\n", ancestor));
    }
    out.push_str("// Generated file, regenerated when the type changes.\n\n");
    out.push_str("use stratum_runtime::{DynObject, TypeHandle, Value};\n\n");

    for inner in inner_stubs {
        let simple = inner.rsplit('.').next().unwrap_or(inner.as_str());
        out.push_str(&format!(
            "#[path = \"{}/{}{}.rs\"]\npub mod {};\n",
            node.name,
            simple,
            suffix,
            snake_case(&format!("{}{}", simple, suffix))
        ));
    }
    if !inner_stubs.is_empty() {
        out.push('\n');
    }

    out.push_str(&format!("pub struct {} {{\n    inner: DynObject,\n}}\n\n", stub_name));
    out.push_str(&format!("impl {} {{\n", stub_name));
    out.push_str(&format!(
        "    pub const QUALIFIED_NAME: &'static str = \"{}\";\n",
        node.qualified_name
    ));

    for (i, params) in constructors.iter().enumerate() {
        let name = if i == 0 { "new".to_string() } else { format!("new_{}", i) };
        let mut signature = String::from("type_handle: TypeHandle");
        let mut args = Vec::new();
        for (j, ty) in params.iter().enumerate() {
            signature.push_str(&format!(", a{}: {}", j, ty.stub_type()));
            args.push(format!("Value::from(a{})", j));
        }
        out.push_str(&format!(
            "\n    pub fn {}({}) -> Self {{\n        Self {{ inner: DynObject::construct(type_handle, &[{}]) }}\n    }}\n",
            name,
            signature,
            args.join(", ")
        ));
    }

    out.push_str(
        "\n    pub fn get_property(&self, name: &str) -> Value {\n        self.inner.get_property(name)\n    }\n",
    );
    out.push_str(
        "\n    pub fn get_property_at(&self, index: usize) -> Value {\n        self.inner.get_property_at(index)\n    }\n",
    );
    out.push_str(
        "\n    pub fn set_property(&self, name: &str, value: Value) {\n        self.inner.set_property(name, value)\n    }\n",
    );
    out.push_str(
        "\n    pub fn invoke(&self, name: &str, args: &[Value]) -> Value {\n        self.inner.invoke(name, args)\n    }\n",
    );

    let table = system.get_property_slots(id);
    for slot in table.instance_slots() {
        let SlotPosition::Fixed(index) = slot.position else {
            continue;
        };
        out.push_str(&format!(
            "\n    pub fn {}(&self) -> Value {{\n        self.inner.get_property_at({})\n    }}\n",
            snake_case(&slot.name),
            index
        ));
    }

    let methods: Vec<MethodDecl> = instance_methods(system, id).into_values().collect();
    for (method, fn_name) in methods.iter().zip(method_fn_names(&methods)) {
        out.push_str(&render_method(method, &fn_name));
    }
    out.push_str("}\n");
    Ok(out)
}

/// Instance methods visible through the modify chain, latest declaration
/// per signature
fn instance_methods(system: &TypeSystem, id: TypeId) -> IndexMap<String, MethodDecl> {
    let mut methods = IndexMap::new();
    for link in system.modify_chain(id) {
        let Some(node) = system.node(link) else {
            continue;
        };
        for method in node.methods().filter(|m| !m.modifiers.is_static) {
            methods.insert(method.signature(), method.clone());
        }
    }
    methods
}

/// `call_<name>` plus the arity. Overloads sharing a name and an arity are
/// told apart by their parameter types, then by position.
fn method_fn_names(methods: &[MethodDecl]) -> Vec<String> {
    let by_arity = |method: &MethodDecl| match method.params.len() {
        0 => format!("call_{}", snake_case(&method.name)),
        arity => format!("call_{}_{}", snake_case(&method.name), arity),
    };
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for method in methods {
        *counts.entry(by_arity(method)).or_default() += 1;
    }

    let mut taken = FxHashSet::default();
    let mut names = Vec::with_capacity(methods.len());
    for method in methods {
        let base = by_arity(method);
        let mut name = if counts.get(&base).copied().unwrap_or(0) > 1 {
            let types: Vec<String> = method
                .params
                .iter()
                .map(|p| p.ty.stub_type().to_lowercase())
                .collect();
            format!("call_{}_{}", snake_case(&method.name), types.join("_"))
        } else {
            base
        };
        let stem = name.clone();
        let mut n = 2;
        while taken.contains(&name) {
            name = format!("{}_{}", stem, n);
            n += 1;
        }
        taken.insert(name.clone());
        names.push(name);
    }
    names
}

fn render_method(method: &MethodDecl, fn_name: &str) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| format!("{}: {}", snake_case(&p.name), p.ty.stub_type()))
        .collect();
    let args: Vec<String> = method
        .params
        .iter()
        .map(|p| format!("Value::from({})", snake_case(&p.name)))
        .collect();
    let call = format!("self.inner.invoke(\"{}\", &[{}])", method.name, args.join(", "));
    let ret = match method.ret {
        TypeRef::Void => String::new(),
        _ => " -> Value".to_string(),
    };
    let body = match method.ret {
        TypeRef::Void => format!("{};", call),
        _ => call,
    };
    format!(
        "\n    pub fn {}(&self{}{}){} {{\n        {}\n    }}\n",
        fn_name,
        if params.is_empty() { "" } else { ", " },
        params.join(", "),
        ret,
        body
    )
}

/// `firstName` -> `first_name`
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("firstName"), "first_name");
        assert_eq!(snake_case("WidgetStub"), "widget_stub");
        assert_eq!(snake_case("x"), "x");
    }

    #[test]
    fn test_content_hash_is_stable_hex() {
        let a = content_hash("pub struct A;");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("pub struct A;"));
        assert_ne!(a, content_hash("pub struct B;"));
    }

    #[test]
    fn test_same_arity_overloads_get_typed_names() {
        let methods = vec![
            MethodDecl::new("resize", TypeRef::Void).param("w", TypeRef::Int),
            MethodDecl::new("resize", TypeRef::Void).param("spec", TypeRef::Str),
            MethodDecl::new("resize", TypeRef::Void)
                .param("w", TypeRef::Int)
                .param("h", TypeRef::Int),
            MethodDecl::new("show", TypeRef::Void),
        ];
        assert_eq!(
            method_fn_names(&methods),
            vec!["call_resize_i32", "call_resize_string", "call_resize_2", "call_show"]
        );
    }

    #[test]
    fn test_overloads_with_same_stub_types_stay_distinct() {
        let methods = vec![
            MethodDecl::new("attach", TypeRef::Void).param("a", TypeRef::Named("demo.A".into())),
            MethodDecl::new("attach", TypeRef::Void).param("b", TypeRef::Any),
        ];
        assert_eq!(method_fn_names(&methods), vec!["call_attach_value", "call_attach_value_2"]);
    }

    #[test]
    fn test_void_method_discards_result() {
        let method = MethodDecl::new("reset", TypeRef::Void);
        let text = render_method(&method, "call_reset");
        assert!(text.contains("pub fn call_reset(&self) {"));
        assert!(text.contains("self.inner.invoke(\"reset\", &[]);"));
    }
}
