//! Relation edges between entity kinds.
//!
//! A [`RelationEdge`] records that entities of a child kind need the identifier the store
//! generates for a parent kind. The parent entity is located through a key extracted from
//! the same source record that produced the child, and the identifier is written into the
//! child through a caller-supplied setter.
//!
//! Edges are plain registrations. Nothing about them is validated when they are declared;
//! the engine checks them when it plans a run.

use std::{any::Any, collections::HashMap, fmt, fmt::Debug, hash::Hash, marker::PhantomData};

use dioxus_logger::tracing;

use crate::{
    error::Error,
    workflow::{
        context::WorkflowContext,
        kind::{EntityKind, KindId},
        step::PersistStep,
    },
};

type ParentKeyFn<S, K> = Box<dyn Fn(&S) -> Option<K> + Send + Sync>;
type IdSetterFn<C, I> = Box<dyn Fn(&mut C, I) + Send + Sync>;

/// Object-safe backfill over one edge, hiding the child, parent and identifier types.
trait Backfill<S, K>: Send + Sync {
    fn parent_key(&self, record: &S) -> Option<K>;

    fn backfill(
        &self,
        edge: &EdgeMeta,
        ctx: &mut WorkflowContext<S, K>,
        parent_binding: &dyn Any,
        records: &HashMap<K, &S>,
    ) -> Result<usize, Error>;
}

struct EdgeMeta {
    child: KindId,
    parent: KindId,
    name: String,
}

struct Link<S, K, C, P, I> {
    parent_key: ParentKeyFn<S, K>,
    id_setter: IdSetterFn<C, I>,
    _parent: PhantomData<fn() -> P>,
}

impl<S, K, C, P, I> Backfill<S, K> for Link<S, K, C, P, I>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
    C: Send + Sync + 'static,
    P: Send + Sync + 'static,
    I: Send + Sync + 'static,
{
    fn parent_key(&self, record: &S) -> Option<K> {
        (self.parent_key)(record)
    }

    fn backfill(
        &self,
        edge: &EdgeMeta,
        ctx: &mut WorkflowContext<S, K>,
        parent_binding: &dyn Any,
        records: &HashMap<K, &S>,
    ) -> Result<usize, Error> {
        let binding = parent_binding
            .downcast_ref::<PersistStep<P, I>>()
            .ok_or(Error::KindConflict { kind: edge.parent })?;

        let (Some(parents), Some(children)) = (
            ctx.slot::<P>(edge.parent)?,
            ctx.slot::<C>(edge.child)?,
        ) else {
            return Ok(0);
        };

        let mut resolved: Vec<(K, I)> = Vec::new();
        for child_key in children.keys() {
            let Some(record) = records.get(child_key) else {
                continue;
            };
            let Some(parent_key) = (self.parent_key)(record) else {
                continue;
            };
            let Some(parent) = parents.get(&parent_key) else {
                continue;
            };
            let Some(id) = binding.generated_id(parent) else {
                continue;
            };

            tracing::trace!(
                "Backfilling id from {} (key: {:?}) into {} (key: {:?}) via relation '{}'",
                edge.parent,
                parent_key,
                edge.child,
                child_key,
                edge.name
            );
            resolved.push((child_key.clone(), id));
        }

        let mut backfilled = 0;
        if let Some(children) = ctx.slot_mut::<C>(edge.child)? {
            for (key, id) in resolved {
                if let Some(child) = children.get_mut(&key) {
                    (self.id_setter)(child, id);
                    backfilled += 1;
                }
            }
        }

        Ok(backfilled)
    }
}

/// One declared dependency: `child` needs `parent`'s generated identifier.
pub struct RelationEdge<S, K> {
    meta: EdgeMeta,
    link: Box<dyn Backfill<S, K>>,
}

impl<S, K> RelationEdge<S, K>
where
    S: Send + Sync + 'static,
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create an edge from `child` to `parent`.
    ///
    /// # Arguments
    /// - `id_setter`: writes the parent's generated identifier into a child entity
    /// - `parent_key`: extracts the parent's source key from the record that produced the
    ///   child; `None` means the record references no parent
    /// - `name`: label used in logs and errors
    pub fn new<C, CI, P, I>(
        child: EntityKind<C, CI>,
        id_setter: impl Fn(&mut C, I) + Send + Sync + 'static,
        parent: EntityKind<P, I>,
        parent_key: impl Fn(&S) -> Option<K> + Send + Sync + 'static,
        name: impl Into<String>,
    ) -> Self
    where
        C: Send + Sync + 'static,
        P: Send + Sync + 'static,
        I: Send + Sync + 'static,
    {
        Self {
            meta: EdgeMeta {
                child: child.id(),
                parent: parent.id(),
                name: name.into(),
            },
            link: Box::new(Link::<S, K, C, P, I> {
                parent_key: Box::new(parent_key),
                id_setter: Box::new(id_setter),
                _parent: PhantomData,
            }),
        }
    }
}

impl<S, K> RelationEdge<S, K> {
    pub fn child(&self) -> KindId {
        self.meta.child
    }

    pub fn parent(&self) -> KindId {
        self.meta.parent
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Parent source key referenced by `record`
    pub fn parent_key(&self, record: &S) -> Option<K> {
        self.link.parent_key(record)
    }

    /// Write parent identifiers into the child entities of this edge.
    ///
    /// `parent_binding` is the parent kind's persistence binding and `records` maps child
    /// source keys to the records that produced them. Children without a record, without
    /// a parent key, without a matching parent entity, or whose parent has no generated
    /// identifier are left untouched. Returns the number of identifiers written.
    pub(crate) fn backfill(
        &self,
        ctx: &mut WorkflowContext<S, K>,
        parent_binding: &dyn Any,
        records: &HashMap<K, &S>,
    ) -> Result<usize, Error> {
        self.link.backfill(&self.meta, ctx, parent_binding, records)
    }
}

impl<S, K> fmt::Debug for RelationEdge<S, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationEdge")
            .field("child", &self.meta.child)
            .field("parent", &self.meta.parent)
            .field("name", &self.meta.name)
            .finish()
    }
}
