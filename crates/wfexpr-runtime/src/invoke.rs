//! Invocation thunks and the bounded invocation cache.
//!
//! [`compile_thunk`] turns a method or constructor descriptor into a closure
//! that skips the per-call registry lookup and signature validation of
//! [`reflect::invoke`](crate::reflect::invoke). [`InvocationCache`] memoizes
//! thunks by `(RegistryId, MemberId)` in a bounded least-recently-used map.
//!
//! # Locking
//!
//! `compile` probes under a shared read lock. On a miss the thunk is compiled
//! with no lock held, then the write lock is taken and the key re-probed: if
//! another thread inserted it meanwhile, the fresh thunk is dropped and the
//! stored one returned. Compilation is a pure function of the descriptor, so
//! either thunk behaves identically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;

use wfexpr_core::error::RuntimeError;
use wfexpr_core::id::{MemberId, RegistryId};
use wfexpr_core::member::{MemberDef, MemberKind, NativeSig};
use wfexpr_core::type_id::TypeRegistry;
use wfexpr_core::value::Value;

use crate::config::RuntimeConfig;
use crate::reflect;

/// A compiled, directly callable member invocation.
pub type Thunk = Arc<NativeSig>;

/// Compiles a method or constructor into a thunk.
///
/// Fields and properties are not invocable; their accessors are methods and
/// are compiled individually.
pub fn compile_thunk(registry: &TypeRegistry, member: MemberId) -> Result<Thunk, RuntimeError> {
    let def = registry.member(member).ok_or_else(|| RuntimeError::Internal {
        message: format!("member {} is not registered", member),
    })?;
    let name = registry.describe_member(member);
    let arity = def.params().len();

    match &def.kind {
        MemberKind::Method { body, .. } => {
            let body = body.clone();
            if def.is_static {
                Ok(Arc::new(move |_receiver: Option<&mut Value>, args: &mut [Value]| {
                    check_arity(&name, arity, args)?;
                    body.call(None, args)
                }))
            } else {
                Ok(Arc::new(move |receiver: Option<&mut Value>, args: &mut [Value]| {
                    check_arity(&name, arity, args)?;
                    match receiver {
                        Some(recv) if !recv.is_null() => body.call(Some(recv), args),
                        _ => Err(RuntimeError::NullOwner {
                            member: name.clone(),
                        }),
                    }
                }))
            }
        }
        MemberKind::Constructor { body, .. } => {
            let template = registry
                .instance_template(def.declaring_type)
                .ok_or_else(|| RuntimeError::Internal {
                    message: format!("{} does not declare a composite", name),
                })?;
            let body = body.clone();
            Ok(Arc::new(move |_receiver: Option<&mut Value>, args: &mut [Value]| {
                check_arity(&name, arity, args)?;
                let mut instance = template.instantiate();
                if let Some(body) = &body {
                    body.call(Some(&mut instance), args)?;
                }
                Ok(instance)
            }))
        }
        MemberKind::Field { .. } | MemberKind::Property { .. } => {
            Err(RuntimeError::NotInvocable { member: name })
        }
    }
}

fn check_arity(name: &str, expected: usize, args: &[Value]) -> Result<(), RuntimeError> {
    if args.len() != expected {
        return Err(RuntimeError::ArityMismatch {
            member: name.to_string(),
            expected,
            actual: args.len(),
        });
    }
    Ok(())
}

/// Identity of a member descriptor across registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub registry: RegistryId,
    pub member: MemberId,
}

struct CacheEntry {
    thunk: Thunk,
    /// Logical clock value of the most recent hit.
    last_used: AtomicU64,
}

/// Snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Misses whose compiled thunk was discarded because another thread
    /// stored one first.
    pub races_lost: u64,
    pub evictions: u64,
}

/// Bounded LRU cache of compiled thunks.
pub struct InvocationCache {
    capacity: usize,
    entries: RwLock<IndexMap<CacheKey, CacheEntry>>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    races_lost: AtomicU64,
    evictions: AtomicU64,
}

impl InvocationCache {
    /// A cache holding at most `capacity` thunks. Capacity 0 stores nothing.
    pub fn new(capacity: usize) -> Self {
        InvocationCache {
            capacity,
            entries: RwLock::new(IndexMap::with_capacity(capacity.min(1024))),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            races_lost: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new(config.invocation_cache_capacity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, registry: RegistryId, member: MemberId) -> bool {
        self.entries
            .read()
            .contains_key(&CacheKey { registry, member })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            races_lost: self.races_lost.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns the thunk for `member`, compiling and storing it on a miss.
    pub fn compile(&self, registry: &TypeRegistry, member: MemberId) -> Result<Thunk, RuntimeError> {
        let key = CacheKey {
            registry: registry.id(),
            member,
        };

        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(&key) {
                entry.last_used.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(&entry.thunk));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("invocation cache miss for {}", registry.describe_member(member));
        let compiled = compile_thunk(registry, member)?;
        if self.capacity == 0 {
            return Ok(compiled);
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get(&key) {
            entry.last_used.store(self.tick(), Ordering::Relaxed);
            self.races_lost.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                "discarding duplicate thunk for {}",
                registry.describe_member(member)
            );
            return Ok(Arc::clone(&entry.thunk));
        }

        entries.insert(
            key,
            CacheEntry {
                thunk: Arc::clone(&compiled),
                last_used: AtomicU64::new(self.tick()),
            },
        );
        while entries.len() > self.capacity {
            let oldest = entries
                .iter()
                .enumerate()
                .min_by_key(|(_, (_, entry))| entry.last_used.load(Ordering::Relaxed))
                .map(|(index, _)| index);
            match oldest.and_then(|index| entries.swap_remove_index(index)) {
                Some((evicted, _)) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        "evicted thunk for member {} of registry {}",
                        evicted.member,
                        evicted.registry
                    );
                }
                None => break,
            }
        }
        Ok(compiled)
    }
}

impl std::fmt::Debug for InvocationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A bound method or constructor, invoked either through a cached thunk or,
/// without a cache, through the slow reflective path on every call.
pub struct MethodHandle {
    registry: Arc<TypeRegistry>,
    member: Arc<MemberDef>,
    cache: Option<Arc<InvocationCache>>,
    thunk: OnceLock<Thunk>,
}

impl MethodHandle {
    pub fn new(
        registry: Arc<TypeRegistry>,
        member: MemberId,
        cache: Option<Arc<InvocationCache>>,
    ) -> Result<Self, RuntimeError> {
        let member = registry
            .member(member)
            .cloned()
            .ok_or_else(|| RuntimeError::Internal {
                message: format!("member {} is not registered", member),
            })?;
        Ok(MethodHandle {
            registry,
            member,
            cache,
            thunk: OnceLock::new(),
        })
    }

    pub fn member(&self) -> &Arc<MemberDef> {
        &self.member
    }

    /// `Declaring.Member`.
    pub fn name(&self) -> String {
        self.registry.describe_member(self.member.id)
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn call(&self, receiver: Option<&mut Value>, args: &mut [Value]) -> Result<Value, RuntimeError> {
        let Some(cache) = &self.cache else {
            return reflect::invoke(&self.registry, self.member.id, receiver, args);
        };
        let thunk = match self.thunk.get() {
            Some(thunk) => thunk,
            None => {
                let compiled = cache.compile(&self.registry, self.member.id)?;
                self.thunk.get_or_init(|| compiled)
            }
        };
        thunk(receiver, args)
    }
}

impl std::fmt::Debug for MethodHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodHandle")
            .field("member", &self.name())
            .field("cached", &self.is_cached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfexpr_core::member::NativeFn;
    use wfexpr_core::type_id::TypeId;
    use wfexpr_core::types::{ParamDef, TypeSemantics};

    fn math(reg: &mut TypeRegistry, count: usize) -> Vec<MemberId> {
        let mut b = reg.register_composite("Math", TypeSemantics::Reference).unwrap();
        let ids = (0..count)
            .map(|i| {
                b.static_method(
                    &format!("Add{}", i),
                    vec![ParamDef::new("x", TypeId::I64)],
                    TypeId::I64,
                    NativeFn::new(move |_, args| {
                        Ok(Value::I64(args[0].as_i64().unwrap_or(0) + i as i64))
                    }),
                )
                .unwrap()
            })
            .collect();
        b.finish();
        ids
    }

    #[test]
    fn hit_after_miss() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 1);
        let cache = InvocationCache::new(4);
        let first = cache.compile(&reg, ids[0]).unwrap();
        let second = cache.compile(&reg, ids[0]).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                races_lost: 0,
                evictions: 0
            }
        );
    }

    #[test]
    fn evicts_least_recently_used() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 3);
        let cache = InvocationCache::new(2);
        cache.compile(&reg, ids[0]).unwrap();
        cache.compile(&reg, ids[1]).unwrap();
        // Touch 0 so that 1 becomes the eviction victim.
        cache.compile(&reg, ids[0]).unwrap();
        cache.compile(&reg, ids[2]).unwrap();

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(reg.id(), ids[0]));
        assert!(!cache.contains(reg.id(), ids[1]));
        assert!(cache.contains(reg.id(), ids[2]));
        assert_eq!(cache.stats().evictions, 1);

        // A miss after eviction recompiles.
        let thunk = cache.compile(&reg, ids[1]).unwrap();
        assert_eq!(thunk(None, &mut [Value::I64(1)][..]).unwrap(), Value::I64(2));
    }

    #[test]
    fn zero_capacity_never_stores() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 1);
        let cache = InvocationCache::new(0);
        cache.compile(&reg, ids[0]).unwrap();
        cache.compile(&reg, ids[0]).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn registries_do_not_collide() {
        let mut a = TypeRegistry::new();
        let mut b = TypeRegistry::new();
        let in_a = math(&mut a, 1);
        let mut builder = b.register_composite("Other", TypeSemantics::Reference).unwrap();
        let in_b = builder
            .static_method(
                "Neg",
                vec![ParamDef::new("x", TypeId::I64)],
                TypeId::I64,
                NativeFn::new(|_, args| Ok(Value::I64(-args[0].as_i64().unwrap_or(0)))),
            )
            .unwrap();
        builder.finish();
        assert_eq!(in_a[0], in_b);

        let cache = InvocationCache::new(8);
        let fa = cache.compile(&a, in_a[0]).unwrap();
        let fb = cache.compile(&b, in_b).unwrap();
        assert_eq!(fa(None, &mut [Value::I64(5)][..]).unwrap(), Value::I64(5));
        assert_eq!(fb(None, &mut [Value::I64(5)][..]).unwrap(), Value::I64(-5));
    }

    #[test]
    fn thunk_checks_arity() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 1);
        let thunk = compile_thunk(&reg, ids[0]).unwrap();
        assert!(matches!(
            thunk(None, Vec::<Value>::new().as_mut_slice()),
            Err(RuntimeError::ArityMismatch { expected: 1, actual: 0, .. })
        ));
    }

    #[test]
    fn handle_without_cache_uses_slow_path() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 1);
        let reg = Arc::new(reg);
        let handle = MethodHandle::new(Arc::clone(&reg), ids[0], None).unwrap();
        assert!(!handle.is_cached());
        // The slow path validates argument types; the thunk does not.
        assert!(matches!(
            handle.call(None, &mut [Value::string("x")]),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert_eq!(handle.call(None, &mut [Value::I64(1)]).unwrap(), Value::I64(1));
    }

    #[test]
    fn handle_with_cache_compiles_once() {
        let mut reg = TypeRegistry::new();
        let ids = math(&mut reg, 1);
        let reg = Arc::new(reg);
        let cache = Arc::new(InvocationCache::new(4));
        let handle = MethodHandle::new(Arc::clone(&reg), ids[0], Some(Arc::clone(&cache))).unwrap();
        for _ in 0..3 {
            assert_eq!(handle.call(None, &mut [Value::I64(2)]).unwrap(), Value::I64(2));
        }
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 0);
    }
}
