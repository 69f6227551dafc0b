//! Per-node member index
//!
//! Maps simple names to the declarations of a node's own body (and of its
//! hidden body). Built lazily and rebuilt whenever the node's version
//! changes.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::model::{AccessorRole, Member, MemberKinds, TypeNode};

/// Result of matching a query against one body
pub(crate) enum BodyMatch {
    Found(Arc<Member>),
    /// Same name, incompatible kind: ancestors are hidden
    Shadowed,
    Absent,
}

/// Name index over one body
#[derive(Debug, Default)]
pub(crate) struct BodyIndex {
    by_name: FxHashMap<String, Vec<Arc<Member>>>,
    getters: FxHashMap<String, Vec<Arc<Member>>>,
    setters: FxHashMap<String, Vec<Arc<Member>>>,
    methods: FxHashMap<String, Vec<Arc<Member>>>,
}

impl BodyIndex {
    /// Index `members`; returns the names declared more than once
    fn build(members: &[Arc<Member>]) -> (Self, Vec<String>) {
        let mut index = BodyIndex::default();
        let mut duplicates = Vec::new();
        let mut signatures: Vec<String> = Vec::new();

        for member in members {
            let Some(name) = member.name() else {
                continue;
            };
            let entry = index.by_name.entry(name.to_string()).or_default();
            if member.is_property_like() && entry.iter().any(|m| m.is_property_like()) {
                duplicates.push(name.to_string());
            }
            entry.push(member.clone());

            if let Member::Method(method) = member.as_ref() {
                let signature = method.signature();
                if signatures.contains(&signature) {
                    duplicates.push(signature);
                } else {
                    signatures.push(signature);
                }
                index
                    .methods
                    .entry(method.name.clone())
                    .or_default()
                    .push(member.clone());
                match method.accessor_property() {
                    Some((AccessorRole::Getter, property)) => {
                        index.getters.entry(property).or_default().push(member.clone())
                    }
                    Some((AccessorRole::Setter, property)) => {
                        index.setters.entry(property).or_default().push(member.clone())
                    }
                    _ => {}
                }
            }
        }
        (index, duplicates)
    }

    /// Match a query, skipping members rejected by `visible`
    pub(crate) fn find(
        &self,
        name: &str,
        kinds: MemberKinds,
        visible: impl Fn(&Member) -> bool,
    ) -> BodyMatch {
        let candidates = self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
        for member in candidates {
            let kind = member.kind();
            if kinds.intersects(kind) && visible(member) {
                return BodyMatch::Found(member.clone());
            }
        }
        for (wanted, table) in [
            (MemberKinds::GET_METHOD, &self.getters),
            (MemberKinds::SET_METHOD, &self.setters),
        ] {
            if !kinds.contains(wanted) {
                continue;
            }
            if let Some(found) = table.get(name).and_then(|ms| ms.iter().find(|m| visible(m))) {
                return BodyMatch::Found(found.clone());
            }
        }

        let shadowed = candidates.iter().any(|member| match member.as_ref() {
            Member::InnerType(_) => true,
            Member::Field(_) => {
                kinds.intersects(MemberKinds::PROPERTY) && !kinds.contains(MemberKinds::FIELD)
            }
            _ => false,
        });
        if shadowed {
            BodyMatch::Shadowed
        } else {
            BodyMatch::Absent
        }
    }

    /// Methods with the given name, in declaration order
    pub(crate) fn methods(&self, name: &str) -> &[Arc<Member>] {
        self.methods.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Member index of one node version
#[derive(Debug)]
pub struct MemberIndex {
    version: u64,
    pub(crate) own: BodyIndex,
    pub(crate) hidden: BodyIndex,
    duplicates: Vec<String>,
}

impl MemberIndex {
    /// Build the index for a node snapshot
    pub fn build(node: &TypeNode) -> Self {
        let (own, mut duplicates) = BodyIndex::build(&node.body);
        let (hidden, hidden_duplicates) = BodyIndex::build(&node.hidden_body);
        duplicates.extend(hidden_duplicates);
        Self {
            version: node.version,
            own,
            hidden,
            duplicates,
        }
    }

    /// Version of the node this index was built from
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Names (or method signatures) declared more than once
    pub fn duplicates(&self) -> &[String] {
        &self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDecl, InnerTypeRef, MethodDecl, TypeId, TypeRef};

    fn body(members: Vec<Member>) -> Vec<Arc<Member>> {
        members.into_iter().map(Arc::new).collect()
    }

    #[test]
    fn test_find_by_kind() {
        let members = body(vec![
            Member::Field(FieldDecl::new("count", TypeRef::Int)),
            Member::Method(MethodDecl::new("getCount", TypeRef::Int)),
            Member::Method(MethodDecl::new("reset", TypeRef::Void)),
        ]);
        let (index, duplicates) = BodyIndex::build(&members);
        assert!(duplicates.is_empty());

        assert!(matches!(
            index.find("count", MemberKinds::FIELD, |_| true),
            BodyMatch::Found(_)
        ));
        assert!(matches!(
            index.find("count", MemberKinds::GET_METHOD, |_| true),
            BodyMatch::Found(m) if m.name() == Some("getCount")
        ));
        assert!(matches!(
            index.find("reset", MemberKinds::METHOD, |_| true),
            BodyMatch::Found(_)
        ));
        assert!(matches!(
            index.find("missing", MemberKinds::all(), |_| true),
            BodyMatch::Absent
        ));
    }

    #[test]
    fn test_inner_type_shadows_method_lookup() {
        let members = body(vec![Member::InnerType(InnerTypeRef {
            name: "label".to_string(),
            id: TypeId(3),
            is_object: true,
            is_static: false,
        })]);
        let (index, _) = BodyIndex::build(&members);
        assert!(matches!(
            index.find("label", MemberKinds::METHOD, |_| true),
            BodyMatch::Shadowed
        ));
        assert!(matches!(
            index.find("label", MemberKinds::OBJECT, |_| true),
            BodyMatch::Found(_)
        ));
    }

    #[test]
    fn test_field_does_not_shadow_methods() {
        let members = body(vec![Member::Field(FieldDecl::new("size", TypeRef::Int))]);
        let (index, _) = BodyIndex::build(&members);
        assert!(matches!(
            index.find("size", MemberKinds::METHOD, |_| true),
            BodyMatch::Absent
        ));
        assert!(matches!(
            index.find("size", MemberKinds::GET_METHOD, |_| true),
            BodyMatch::Shadowed
        ));
    }

    #[test]
    fn test_duplicates_reported() {
        let members = body(vec![
            Member::Field(FieldDecl::new("x", TypeRef::Int)),
            Member::Field(FieldDecl::new("x", TypeRef::Str)),
            Member::Method(MethodDecl::new("run", TypeRef::Void)),
            Member::Method(MethodDecl::new("run", TypeRef::Void)),
            Member::Method(MethodDecl::new("run", TypeRef::Void).param("n", TypeRef::Int)),
        ]);
        let (_, duplicates) = BodyIndex::build(&members);
        assert_eq!(duplicates, vec!["x".to_string(), "run()".to_string()]);
    }

    #[test]
    fn test_invisible_members_skipped() {
        let members = body(vec![Member::Field(FieldDecl::new("secret", TypeRef::Int))]);
        let (index, _) = BodyIndex::build(&members);
        assert!(matches!(
            index.find("secret", MemberKinds::FIELD, |_| false),
            BodyMatch::Absent
        ));
    }
}
