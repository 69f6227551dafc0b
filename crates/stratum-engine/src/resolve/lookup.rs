//! Lookup algorithm, visibility and overload selection

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::diagnostics::DiagnosticKind;
use crate::model::{Access, Member, MemberKinds, MethodDecl, TypeId, TypeNode, TypeRef};
use crate::resolve::index::{BodyMatch, MemberIndex};
use crate::resolve::{CachedLookup, Lookup, MemberKey, MemberOrigin, ResolvedMember};
use crate::system::{NodeCell, TypeSystem};

/// One lookup request
struct MemberQuery<'a> {
    name: &'a str,
    kinds: MemberKinds,
    transformed: bool,
    ref_type: Option<TypeId>,
}

impl MemberQuery<'_> {
    fn key(&self) -> MemberKey {
        MemberKey {
            name: self.name.to_string(),
            kinds: self.kinds,
            transformed: self.transformed,
            ref_type: self.ref_type,
        }
    }
}

/// Overload candidate collected along the hierarchy
struct Candidate {
    member: Arc<Member>,
    owner: TypeId,
    origin: MemberOrigin,
}

impl Candidate {
    fn method(&self) -> Option<&MethodDecl> {
        self.member.as_method()
    }
}

impl TypeSystem {
    /// Resolve a member of the most specific version of `id`
    pub fn lookup_member(
        &self,
        id: TypeId,
        name: &str,
        kinds: MemberKinds,
        ref_type: Option<TypeId>,
    ) -> Lookup {
        self.lookup_member_in(id, name, kinds, ref_type, false)
    }

    /// `lookup_member` with an explicit transformed-context flag
    pub fn lookup_member_in(
        &self,
        id: TypeId,
        name: &str,
        kinds: MemberKinds,
        ref_type: Option<TypeId>,
        transformed: bool,
    ) -> Lookup {
        let query = MemberQuery {
            name,
            kinds,
            transformed,
            ref_type,
        };
        let target = self.resolve(id, true);
        self.lookup_at(target, &query, 0)
    }

    /// Resolve a member, reporting shadowed names as not found
    pub fn resolve_member(
        &self,
        id: TypeId,
        name: &str,
        kinds: MemberKinds,
        ref_type: Option<TypeId>,
    ) -> Option<ResolvedMember> {
        self.lookup_member(id, name, kinds, ref_type).found()
    }

    /// Member index of the node's current version
    pub fn member_index(&self, id: TypeId) -> Option<Arc<MemberIndex>> {
        let cell = self.cell(id)?;
        let node = cell.snapshot();
        Some(self.index_for(&cell, &node))
    }

    fn index_for(&self, cell: &NodeCell, node: &TypeNode) -> Arc<MemberIndex> {
        if let Some(index) = cell.index.lock().as_ref() {
            if index.version() == node.version {
                return index.clone();
            }
        }
        let index = Arc::new(MemberIndex::build(node));
        tracing::debug!(type_name = %node.qualified_name, version = node.version, "built member index");
        for duplicate in index.duplicates() {
            self.diagnostics().report(
                DiagnosticKind::DuplicateDeclaration,
                &node.qualified_name,
                format!("{} is declared more than once; the first declaration wins", duplicate),
            );
        }
        let mut slot = cell.index.lock();
        let newer = slot.as_ref().is_some_and(|cached| cached.version() > index.version());
        if !newer {
            *slot = Some(index.clone());
        }
        index
    }

    /// Node-level lookup: `id` is searched as is, without resolving it
    fn lookup_at(&self, id: TypeId, query: &MemberQuery<'_>, depth: usize) -> Lookup {
        let Some(cell) = self.cell(id) else {
            return Lookup::NotFound;
        };
        let node = cell.snapshot();
        if depth > self.options().max_chain_depth {
            self.diagnostics().report(
                DiagnosticKind::CycleGuard,
                &node.qualified_name,
                format!("lookup of {} exceeds the depth guard", query.name),
            );
            return Lookup::NotFound;
        }
        if node.removed {
            return Lookup::NotFound;
        }

        let key = query.key();
        if let Some(hit) = cell
            .members
            .get(&key)
            .and_then(|entry| entry.valid_at(node.version).cloned())
        {
            return hit;
        }

        let result = self.lookup_uncached(&cell, &node, query, depth);
        cell.members.insert(
            key,
            CachedLookup {
                version: node.version,
                result: result.clone(),
            },
        );
        result
    }

    fn lookup_uncached(
        &self,
        cell: &NodeCell,
        node: &TypeNode,
        query: &MemberQuery<'_>,
        depth: usize,
    ) -> Lookup {
        let index = self.index_for(cell, node);
        let visible = |member: &Member| self.is_visible(member, node, query.ref_type);
        let found = |member: Arc<Member>, origin| {
            Lookup::Found(ResolvedMember {
                member,
                owner: node.id,
                origin,
            })
        };

        let own = index.own.find(query.name, query.kinds, visible);
        if let BodyMatch::Found(member) = &own {
            return found(member.clone(), MemberOrigin::Body);
        }
        if let BodyMatch::Found(member) = index.hidden.find(query.name, query.kinds, visible) {
            return found(member, MemberOrigin::Hidden);
        }
        if query.kinds.contains(MemberKinds::METHOD)
            && node.is_component()
            && self.options().is_component_method(query.name)
        {
            let method = MethodDecl::new(query.name, TypeRef::Void);
            return found(Arc::new(Member::Method(method)), MemberOrigin::Synthesized);
        }
        if matches!(own, BodyMatch::Shadowed) {
            return Lookup::Stop;
        }

        for next in self.lookup_successors(node, query.transformed) {
            match self.lookup_at(next, query, depth + 1) {
                Lookup::NotFound => continue,
                result => return result,
            }
        }
        Lookup::NotFound
    }

    /// Nodes searched after a node's own bodies, in order
    fn lookup_successors(&self, node: &TypeNode, transformed: bool) -> Vec<TypeId> {
        let mut next = Vec::new();
        if transformed {
            next.extend(node.transformed);
        }
        if node.is_modify {
            next.extend(node.replaces);
            // a modify overlay that changes the base type searches it too
            if let Some(base) = node.extends.as_deref().and_then(|name| self.find_type(name)) {
                next.push(base);
            }
        } else if let Some(base) = self.extends_type(node.id) {
            next.push(base);
        }
        for name in node.interfaces.iter().chain(node.scope_interfaces.iter()) {
            match self.find_type(name) {
                Some(id) => next.push(id),
                None => self.diagnostics().report(
                    DiagnosticKind::UnresolvedType,
                    &node.qualified_name,
                    format!("interface {} is not declared", name),
                ),
            }
        }
        next.retain(|id| *id != node.id);
        next
    }

    /// Visibility of `member` declared in `owner` from `ref_type`
    pub(crate) fn is_visible(&self, member: &Member, owner: &TypeNode, ref_type: Option<TypeId>) -> bool {
        let access = member.access();
        if access == Access::Public {
            return true;
        }
        let Some(reference) = ref_type.and_then(|id| self.node(id)) else {
            return true;
        };
        let same_type = nested_in(&reference.qualified_name, &owner.qualified_name)
            || nested_in(&owner.qualified_name, &reference.qualified_name);
        let same_package = reference.package == owner.package;
        match access {
            Access::Public => true,
            Access::Private => same_type,
            Access::Package => same_package,
            Access::Protected => {
                same_type
                    || same_package
                    || self.is_subtype_name(&reference.qualified_name, &owner.qualified_name)
            }
        }
    }

    // ========================================================================
    // Overloads
    // ========================================================================

    /// Select the most specific overload of `name` applicable to `args`.
    ///
    /// Overrides in derived types hide base declarations with the same
    /// signature. Ties go to the first declaration; incomparable candidates
    /// record an `AmbiguousOverload` diagnostic and the first one wins.
    pub fn resolve_method(
        &self,
        id: TypeId,
        name: &str,
        args: &[TypeRef],
        ref_type: Option<TypeId>,
    ) -> Option<ResolvedMember> {
        let target = self.resolve(id, true);
        if self.lookup_member(target, name, MemberKinds::METHOD, ref_type).is_stop() {
            return None;
        }

        let mut candidates = Vec::new();
        let mut signatures = FxHashSet::default();
        let mut visited = FxHashSet::default();
        self.collect_methods(target, name, ref_type, &mut candidates, &mut signatures, &mut visited, 0);

        let applicable: Vec<(&Candidate, &MethodDecl)> = candidates
            .iter()
            .filter_map(|c| c.method().map(|m| (c, m)))
            .filter(|&(_, m)| {
                m.params.len() == args.len()
                    && m.params.iter().zip(args).all(|(p, a)| self.is_assignable(a, &p.ty))
            })
            .collect();

        let maximal: Vec<(&Candidate, &MethodDecl)> = applicable
            .iter()
            .copied()
            .filter(|&(_, m)| {
                !applicable
                    .iter()
                    .any(|&(_, d)| self.more_specific(d, m) && !self.more_specific(m, d))
            })
            .collect();

        let &(first, first_method) = maximal.first()?;
        let ambiguous = maximal.iter().any(|&(_, m)| {
            !(self.more_specific(m, first_method) && self.more_specific(first_method, m))
        });
        if ambiguous {
            let type_name = self.qualified_name(target).unwrap_or_default();
            let signatures: Vec<String> = maximal.iter().map(|(_, m)| m.signature()).collect();
            self.diagnostics().report(
                DiagnosticKind::AmbiguousOverload,
                &type_name,
                format!("ambiguous call to {}: {}", name, signatures.join(", ")),
            );
        }

        Some(ResolvedMember {
            member: first.member.clone(),
            owner: first.owner,
            origin: first.origin,
        })
    }

    /// Every parameter of `a` is assignable to the matching one of `b`
    fn more_specific(&self, a: &MethodDecl, b: &MethodDecl) -> bool {
        a.params
            .iter()
            .zip(&b.params)
            .all(|(pa, pb)| self.is_assignable(&pa.ty, &pb.ty))
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_methods(
        &self,
        id: TypeId,
        name: &str,
        ref_type: Option<TypeId>,
        out: &mut Vec<Candidate>,
        signatures: &mut FxHashSet<String>,
        visited: &mut FxHashSet<TypeId>,
        depth: usize,
    ) {
        if depth > self.options().max_chain_depth || !visited.insert(id) {
            return;
        }
        let Some(cell) = self.cell(id) else {
            return;
        };
        let node = cell.snapshot();
        if node.removed {
            return;
        }
        let index = self.index_for(&cell, &node);

        for (body, origin) in [
            (&index.own, MemberOrigin::Body),
            (&index.hidden, MemberOrigin::Hidden),
        ] {
            for member in body.methods(name) {
                let Some(method) = member.as_method() else {
                    continue;
                };
                if !self.is_visible(member, &node, ref_type) {
                    continue;
                }
                if signatures.insert(method.signature()) {
                    out.push(Candidate {
                        member: member.clone(),
                        owner: node.id,
                        origin,
                    });
                }
            }
        }
        if node.is_component() && self.options().is_component_method(name) {
            let method = MethodDecl::new(name, TypeRef::Void);
            if signatures.insert(method.signature()) {
                out.push(Candidate {
                    member: Arc::new(Member::Method(method)),
                    owner: node.id,
                    origin: MemberOrigin::Synthesized,
                });
            }
        }

        for next in self.lookup_successors(&node, false) {
            self.collect_methods(next, name, ref_type, out, signatures, visited, depth + 1);
        }
    }
}

/// `inner` is `outer` or declared (transitively) inside it
fn nested_in(inner: &str, outer: &str) -> bool {
    inner == outer
        || inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('.'))
}
