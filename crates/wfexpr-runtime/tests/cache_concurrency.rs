//! Invocation cache and operator table behaviour under concurrent use.

use std::sync::Arc;
use std::thread;

use wfexpr_core::expr::BinaryOp;
use wfexpr_core::member::NativeFn;
use wfexpr_core::type_id::{TypeId, TypeRegistry};
use wfexpr_core::types::{ParamDef, TypeSemantics};
use wfexpr_core::value::Value;
use wfexpr_core::MemberId;
use wfexpr_runtime::{InvocationCache, MapContext, MetadataCache, MethodHandle, RuntimeConfig};

fn registry(methods: usize) -> (Arc<TypeRegistry>, Vec<MemberId>) {
    let mut reg = TypeRegistry::new();
    let mut b = reg.register_composite("Ops", TypeSemantics::Reference).unwrap();
    let ids = (0..methods)
        .map(|i| {
            b.static_method(
                &format!("Scale{}", i),
                vec![ParamDef::new("n", TypeId::I64)],
                TypeId::I64,
                NativeFn::new(move |_, args| Ok(Value::I64(args[0].as_i64().unwrap_or(0) * i as i64))),
            )
            .unwrap()
        })
        .collect();
    b.finish();
    (Arc::new(reg), ids)
}

#[test]
fn threads_compiling_one_member_share_an_entry() {
    let (reg, ids) = registry(1);
    let cache = InvocationCache::new(16);
    let results: Vec<Value> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                s.spawn(|| {
                    let thunk = cache.compile(&reg, ids[0]).unwrap();
                    thunk(None, &mut [Value::I64(21)][..]).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results.iter().all(|v| *v == Value::I64(0)));
    assert_eq!(cache.len(), 1);
    let stats = cache.stats();
    assert_eq!(stats.hits + stats.misses, 8);
    // Every miss either stored the thunk or lost the race to another thread.
    assert_eq!(stats.misses, 1 + stats.races_lost);
}

#[test]
fn distinct_members_never_share_an_entry() {
    let (reg, ids) = registry(6);
    let cache = Arc::new(InvocationCache::new(64));
    thread::scope(|s| {
        for (i, id) in ids.iter().enumerate() {
            let reg = Arc::clone(&reg);
            let cache = Arc::clone(&cache);
            let id = *id;
            s.spawn(move || {
                let handle = MethodHandle::new(reg, id, Some(cache)).unwrap();
                for _ in 0..50 {
                    let out = handle.call(None, &mut [Value::I64(2)]).unwrap();
                    assert_eq!(out, Value::I64(2 * i as i64));
                }
            });
        }
    });
    assert_eq!(cache.len(), ids.len());
    for id in &ids {
        assert!(cache.contains(reg.id(), *id));
    }
}

#[test]
fn bounded_cache_stays_correct_under_churn() {
    let (reg, ids) = registry(12);
    let cache = InvocationCache::new(4);
    thread::scope(|s| {
        for t in 0..4 {
            let (reg, ids, cache) = (&reg, &ids, &cache);
            s.spawn(move || {
                for round in 0..30 {
                    let i = (t * 7 + round) % ids.len();
                    let thunk = cache.compile(reg, ids[i]).unwrap();
                    assert_eq!(thunk(None, &mut [Value::I64(3)][..]).unwrap(), Value::I64(3 * i as i64));
                }
            });
        }
    });
    assert!(cache.len() <= 4);
    assert!(cache.stats().evictions > 0);
}

#[test]
fn shared_operator_slots_across_threads() {
    let reg = Arc::new(TypeRegistry::new());
    let cache = MetadataCache::new(RuntimeConfig::default());
    let sums: Vec<Value> = thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|i| {
                let (reg, cache) = (&reg, &cache);
                s.spawn(move || {
                    let add = cache
                        .operators()
                        .binary(reg, cache.invocations(), BinaryOp::Add, TypeId::I32, TypeId::I32, true, None)
                        .unwrap();
                    (add.func)(&MapContext::new(), &mut [Value::I32(i), Value::I32(1)][..]).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(sums.len(), 6);
    assert_eq!(cache.operators().len(), 1);
    assert_eq!(cache.operators().published(), 1);
}
