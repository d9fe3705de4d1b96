//! End-to-end conversion tests.
//!
//! Each test registers a small host model, converts expression trees with a
//! `Converter`, evaluates the graphs against a `MapContext` and checks the
//! observable state. Covered here:
//! - round trips through fields, properties, arrays, indexers, calls and
//!   construction
//! - value-type copy-back through nested owners
//! - explicit evaluation order
//! - concurrent evaluation of one graph and idempotence of pure graphs
//! - conversion errors for read-only indexers and lambdas

use std::sync::{Arc, Mutex};
use std::thread;

use proptest::prelude::*;

use wfexpr_convert::{ConversionError, Converter, ConverterOptions, ErrorMode, Scope};
use wfexpr_core::expr::{BinaryOp, Expr};
use wfexpr_core::id::{SymbolRef, VariableId};
use wfexpr_core::member::NativeFn;
use wfexpr_core::type_id::{TypeId, TypeRegistry};
use wfexpr_core::types::{ParamDef, TypeSemantics};
use wfexpr_core::value::{ArrayRef, Value};
use wfexpr_core::{MemberId, RuntimeError};
use wfexpr_runtime::{MapContext, MetadataCache, RuntimeConfig};

// ---------------------------------------------------------------------------
// Host model
// ---------------------------------------------------------------------------

struct Model {
    converter: Converter,
    inner: TypeId,
    outer: TypeId,
    triple: TypeId,
    table: TypeId,
    /// `Inner.Field`
    field: MemberId,
    /// `Outer.Inner`
    outer_inner: MemberId,
    /// `Triple.Total`
    total: MemberId,
    /// `Triple.Name` property backed by slot 1.
    name: MemberId,
    /// static `Triple.Sum(a, b)`
    sum: MemberId,
    /// static `Triple.Trace(tag)`, appends `tag` to `trace`.
    trace_method: MemberId,
    /// `Triple.Add(n)` instance method.
    add: MemberId,
    trace: Arc<Mutex<Vec<i32>>>,
}

fn i32_of(v: &Value) -> i32 {
    v.as_i64().unwrap_or(0) as i32
}

/// Constructor body storing the sum of its arguments in `Total`.
fn store_sum(recv: Option<&mut Value>, args: &mut [Value]) -> Result<Value, RuntimeError> {
    let sum: i32 = args.iter().map(i32_of).sum();
    if let Some(Value::Object(o)) = recv {
        o.set_field(0, Value::I32(sum));
    }
    Ok(Value::Unit)
}

fn model() -> Model {
    let mut reg = TypeRegistry::new();

    let mut b = reg.register_composite("Inner", TypeSemantics::Value).unwrap();
    let inner = b.type_id();
    let field = b.field("Field", TypeId::I32).unwrap();
    b.finish();

    let mut b = reg.register_composite("Outer", TypeSemantics::Value).unwrap();
    let outer = b.type_id();
    let outer_inner = b.field("Inner", inner).unwrap();
    b.finish();

    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut b = reg.register_composite("Triple", TypeSemantics::Reference).unwrap();
    let triple = b.type_id();
    let total = b.field("Total", TypeId::I32).unwrap();
    b.field("name", TypeId::STRING).unwrap();
    let name = b
        .property(
            "Name",
            TypeId::STRING,
            Some(NativeFn::new(|recv, _| match recv {
                Some(Value::Object(o)) => Ok(o.field(1).unwrap_or(Value::Null)),
                _ => Err(RuntimeError::Internal { message: "no triple".into() }),
            })),
            Some(NativeFn::new(|recv, args| {
                if let Some(Value::Object(o)) = recv {
                    o.set_field(1, args[0].clone());
                }
                Ok(Value::Unit)
            })),
        )
        .unwrap();
    b.constructor(vec![], None).unwrap();
    b.constructor(vec![ParamDef::new("a", TypeId::I32)], Some(NativeFn::new(store_sum)))
        .unwrap();
    b.constructor(
        vec![ParamDef::new("a", TypeId::I32), ParamDef::new("b", TypeId::I32)],
        Some(NativeFn::new(store_sum)),
    )
    .unwrap();
    b.constructor(
        vec![
            ParamDef::new("a", TypeId::I32),
            ParamDef::new("b", TypeId::I32),
            ParamDef::new("c", TypeId::I32),
        ],
        Some(NativeFn::new(store_sum)),
    )
    .unwrap();
    let sum = b
        .static_method(
            "Sum",
            vec![ParamDef::new("a", TypeId::I32), ParamDef::new("b", TypeId::I32)],
            TypeId::I32,
            NativeFn::new(|_, args| Ok(Value::I32(i32_of(&args[0]) + i32_of(&args[1])))),
        )
        .unwrap();
    let log = Arc::clone(&trace);
    let trace_method = b
        .static_method(
            "Trace",
            vec![ParamDef::new("tag", TypeId::I32)],
            TypeId::I32,
            NativeFn::new(move |_, args| {
                log.lock().unwrap().push(i32_of(&args[0]));
                Ok(args[0].clone())
            }),
        )
        .unwrap();
    let add = b
        .method(
            "Add",
            vec![ParamDef::new("n", TypeId::I32)],
            TypeId::I32,
            NativeFn::new(|recv, args| match recv {
                Some(Value::Object(o)) => {
                    let next = o.field(0).as_ref().map(i32_of).unwrap_or(0) + i32_of(&args[0]);
                    o.set_field(0, Value::I32(next));
                    Ok(Value::I32(next))
                }
                _ => Err(RuntimeError::Internal { message: "no triple".into() }),
            }),
        )
        .unwrap();
    b.finish();

    // Read-only indexer over a string key.
    let mut b = reg.register_composite("Table", TypeSemantics::Reference).unwrap();
    let table = b.type_id();
    b.indexer(
        TypeId::I32,
        vec![TypeId::STRING],
        Some(NativeFn::new(|_, args| {
            Ok(Value::I32(args[0].as_str().map_or(0, |s| s.len() as i32)))
        })),
        None,
    )
    .unwrap();
    b.finish();

    reg.array_of(TypeId::I32, 1);
    reg.array_of(TypeId::I32, 2);

    Model {
        converter: Converter::with_cache(
            Arc::new(reg),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        ),
        inner,
        outer,
        triple,
        table,
        field,
        outer_inner,
        total,
        name,
        sum,
        trace_method,
        add,
        trace,
    }
}

fn var(n: u32) -> SymbolRef {
    SymbolRef::Variable(VariableId(n))
}

fn get(n: u32, ty: TypeId) -> Expr {
    Expr::variable(VariableId(n), ty)
}

impl Model {
    fn instance(&self, ty: TypeId) -> Value {
        self.converter
            .registry()
            .instance_template(ty)
            .unwrap()
            .instantiate()
    }
}

// ---------------------------------------------------------------------------
// Copy-back
// ---------------------------------------------------------------------------

#[test]
fn nested_value_type_write_reaches_the_variable() {
    let m = model();
    let ctx = MapContext::new();
    ctx.bind(var(0), m.instance(m.outer));

    // outer.Inner.Field = 41
    let path = Expr::member(Expr::member(get(0, m.outer), m.outer_inner), m.field);
    let target = m.converter.convert_reference::<i32>(&path).unwrap();
    target.resolve_location(&ctx).unwrap().set(&ctx, 41).unwrap();

    let read = m.converter.convert::<i32>(&path).unwrap();
    assert_eq!(read.evaluate(&ctx).unwrap(), 41);
    assert_eq!(target.evaluate(&ctx).unwrap(), 41);

    let graph = target.inspect();
    assert_eq!(graph.nodes_of_kind("FieldReference").count(), 2);
    assert_eq!(graph.nodes_of_kind("VariableReference").count(), 1);
}

#[test]
fn writes_through_a_copy_are_not_observed() {
    let m = model();
    let ctx = MapContext::new();
    ctx.bind(var(0), m.instance(m.outer));

    // copy = outer.Inner
    let copy = m
        .converter
        .convert::<Value>(&Expr::member(get(0, m.outer), m.outer_inner))
        .unwrap()
        .evaluate(&ctx)
        .unwrap();
    ctx.bind(var(1), copy);

    // copy.Field = 7
    let copy_field = m
        .converter
        .convert_reference::<i32>(&Expr::member(get(1, m.inner), m.field))
        .unwrap();
    copy_field.resolve_location(&ctx).unwrap().set(&ctx, 7).unwrap();
    assert_eq!(copy_field.evaluate(&ctx).unwrap(), 7);

    let original = m
        .converter
        .convert::<i32>(&Expr::member(Expr::member(get(0, m.outer), m.outer_inner), m.field))
        .unwrap();
    assert_eq!(original.evaluate(&ctx).unwrap(), 0);
}

#[test]
fn value_type_array_element_receives_copy_back() {
    let mut reg = TypeRegistry::new();
    let mut b = reg.register_composite("Cell", TypeSemantics::Value).unwrap();
    let cell = b.type_id();
    let value = b.field("Value", TypeId::I64).unwrap();
    b.finish();
    let cells = reg.array_of(cell, 1);
    let fill = reg.default_value(cell);
    let converter = Converter::with_cache(
        Arc::new(reg),
        Arc::new(MetadataCache::new(RuntimeConfig::default())),
    );
    let ctx = MapContext::new();
    ctx.bind(var(0), Value::Array(ArrayRef::new(cells, cell, &[3], fill)));

    // cells[2].Value = 5
    let path = Expr::member(Expr::array_index(get(0, cells), Expr::i32(2)), value);
    let target = converter.convert_reference::<i64>(&path).unwrap();
    target.resolve_location(&ctx).unwrap().set(&ctx, 5).unwrap();
    assert_eq!(converter.convert::<i64>(&path).unwrap().evaluate(&ctx).unwrap(), 5);

    let neighbour = Expr::member(Expr::array_index(get(0, cells), Expr::i32(1)), value);
    assert_eq!(converter.convert::<i64>(&neighbour).unwrap().evaluate(&ctx).unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn reference_type_field_and_property_round_trip() {
    let m = model();
    let ctx = MapContext::new();
    ctx.bind(var(0), m.instance(m.triple));

    let total = Expr::member(get(0, m.triple), m.total);
    m.converter
        .convert_reference::<i32>(&total)
        .unwrap()
        .resolve_location(&ctx)
        .unwrap()
        .set(&ctx, 12)
        .unwrap();
    assert_eq!(m.converter.convert::<i32>(&total).unwrap().evaluate(&ctx).unwrap(), 12);

    let name = Expr::member(get(0, m.triple), m.name);
    let location = m
        .converter
        .convert_reference::<String>(&name)
        .unwrap()
        .resolve_location(&ctx)
        .unwrap();
    location.set(&ctx, "abc".to_string()).unwrap();
    assert_eq!(m.converter.convert::<String>(&name).unwrap().evaluate(&ctx).unwrap(), "abc");
}

#[test]
fn construction_with_zero_to_three_arguments() {
    let m = model();
    let ctx = MapContext::new();
    for n in 0..=3 {
        let args: Vec<Expr> = (1..=n).map(Expr::i32).collect();
        let expected: i32 = (1..=n).sum();
        let expr = Expr::member(Expr::new_object(m.triple, args), m.total);
        let graph = m.converter.convert::<i32>(&expr).unwrap();
        assert_eq!(graph.evaluate(&ctx).unwrap(), expected, "{} constructor arguments", n);
    }
}

#[test]
fn static_and_instance_method_invocation() {
    let m = model();
    let ctx = MapContext::new();
    ctx.bind(var(0), m.instance(m.triple));

    let sum = m
        .converter
        .convert::<i32>(&Expr::static_call(m.sum, vec![Expr::i32(20), Expr::i32(22)]))
        .unwrap();
    assert_eq!(sum.evaluate(&ctx).unwrap(), 42);

    let add = m
        .converter
        .convert::<i32>(&Expr::call(get(0, m.triple), m.add, vec![Expr::i32(3)]))
        .unwrap();
    assert_eq!(add.evaluate(&ctx).unwrap(), 3);
    assert_eq!(add.evaluate(&ctx).unwrap(), 6);

    ctx.bind(var(1), Value::Null);
    let on_null = m
        .converter
        .convert::<i32>(&Expr::call(get(1, m.triple), m.add, vec![Expr::i32(1)]))
        .unwrap();
    assert!(matches!(
        on_null.evaluate(&ctx),
        Err(RuntimeError::NullOwner { .. })
    ));
}

#[test]
fn multidimensional_arrays_and_indexers() {
    let m = model();
    let ctx = MapContext::new();
    let grid = m.converter.registry().find_array(TypeId::I32, 2).unwrap();
    ctx.bind(var(0), Value::Array(ArrayRef::new(grid, TypeId::I32, &[2, 2], Value::I32(0))));
    let cell = Expr::index(get(0, grid), vec![Expr::i32(1), Expr::i32(0)]);
    m.converter
        .convert_reference::<i32>(&cell)
        .unwrap()
        .resolve_location(&ctx)
        .unwrap()
        .set(&ctx, 3)
        .unwrap();
    assert_eq!(m.converter.convert::<i32>(&cell).unwrap().evaluate(&ctx).unwrap(), 3);

    ctx.bind(var(1), m.instance(m.table));
    let entry = Expr::index(get(1, m.table), vec![Expr::string("four")]);
    assert_eq!(m.converter.convert::<i32>(&entry).unwrap().evaluate(&ctx).unwrap(), 4);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn read_only_indexer_cannot_be_assigned() {
    let m = model();
    let entry = Expr::index(get(1, m.table), vec![Expr::string("k")]);
    let err = m.converter.convert_reference::<i32>(&entry).unwrap_err();
    assert!(matches!(err, ConversionError::MemberReadOnly { .. }));
}

#[test]
fn lambda_is_unsupported_in_both_modes() {
    let m = model();
    let lambda = Expr::Lambda {
        params: vec![ParamDef::new("x", TypeId::I32)],
        body: Box::new(Expr::i32(1)),
    };
    assert!(matches!(
        m.converter.convert::<i32>(&lambda),
        Err(ConversionError::UnsupportedNodeKind { .. })
    ));

    let reporting = model().converter.with_options(ConverterOptions {
        error_mode: ErrorMode::Report,
        checked_arithmetic: false,
    });
    let mut sink: Vec<String> = Vec::new();
    assert!(reporting.convert_with_mode::<i32>(&lambda, &mut sink).unwrap().is_none());
    assert!(reporting.try_convert_reference::<i32>(&lambda, &mut sink).is_none());
    assert_eq!(sink.len(), 2);
}

// ---------------------------------------------------------------------------
// Evaluation order, idempotence, concurrency
// ---------------------------------------------------------------------------

#[test]
fn evaluation_follows_order_indices() {
    let m = model();
    let traced = |tag: i32| Expr::static_call(m.trace_method, vec![Expr::i32(tag)]);

    let reversed = Expr::binary(
        BinaryOp::Subtract,
        Expr::ordered(1, traced(10)),
        Expr::ordered(0, traced(20)),
    );
    let graph = m.converter.convert::<i32>(&reversed).unwrap();
    assert_eq!(graph.evaluate(&MapContext::new()).unwrap(), -10);
    assert_eq!(*m.trace.lock().unwrap(), vec![20, 10]);

    m.trace.lock().unwrap().clear();
    let call = Expr::static_call(
        m.sum,
        vec![Expr::ordered(2, traced(1)), Expr::ordered(1, traced(2))],
    );
    m.converter.convert::<i32>(&call).unwrap().evaluate(&MapContext::new()).unwrap();
    assert_eq!(*m.trace.lock().unwrap(), vec![2, 1]);

    m.trace.lock().unwrap().clear();
    let text_order = Expr::binary(BinaryOp::Add, traced(1), traced(2));
    m.converter.convert::<i32>(&text_order).unwrap().evaluate(&MapContext::new()).unwrap();
    assert_eq!(*m.trace.lock().unwrap(), vec![1, 2]);
}

#[test]
fn pure_graphs_are_idempotent() {
    let m = model();
    let ctx = MapContext::new();
    ctx.bind(var(0), Value::I32(6));
    let expr = Expr::binary(
        BinaryOp::Multiply,
        Expr::static_call(m.sum, vec![get(0, TypeId::I32), Expr::i32(1)]),
        Expr::i32(6),
    );
    let graph = m.converter.convert::<i32>(&expr).unwrap();
    let first = graph.evaluate(&ctx).unwrap();
    for _ in 0..5 {
        assert_eq!(graph.evaluate(&ctx).unwrap(), first);
    }
    assert_eq!(first, 42);
}

#[test]
fn one_graph_evaluated_from_many_threads() {
    let m = model();
    let scope = Scope::new().with("n", var(0), TypeId::I32);
    let converter = Converter::with_cache(Arc::clone(m.converter.registry()), Arc::clone(m.converter.cache()))
        .with_resolver(Arc::new(scope));
    let expr = Expr::static_call(
        m.sum,
        vec![Expr::context_value("n", TypeId::I32), Expr::i32(1)],
    );
    let graph = converter.convert::<i32>(&expr).unwrap();

    let results: Vec<i32> = thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let graph = graph.clone();
                s.spawn(move || {
                    let ctx = MapContext::new();
                    ctx.bind(var(0), Value::I32(i));
                    graph.evaluate(&ctx).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(results, (1..=8).collect::<Vec<_>>());

    let invocations = converter.cache().invocations().unwrap();
    assert!(invocations.contains(converter.registry().id(), m.sum));
}

proptest! {
    #[test]
    fn unchecked_addition_wraps_like_i32(a in any::<i32>(), b in any::<i32>()) {
        let converter = Converter::with_cache(
            Arc::new(TypeRegistry::new()),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        );
        let graph = converter
            .convert::<i32>(&Expr::binary(BinaryOp::Add, Expr::i32(a), Expr::i32(b)))
            .unwrap();
        prop_assert_eq!(graph.evaluate(&MapContext::new()).unwrap(), a.wrapping_add(b));
    }

    #[test]
    fn checked_multiplication_matches_checked_mul(a in any::<i32>(), b in any::<i32>()) {
        let converter = Converter::with_cache(
            Arc::new(TypeRegistry::new()),
            Arc::new(MetadataCache::new(RuntimeConfig::default())),
        );
        let graph = converter
            .convert::<i32>(&Expr::checked(BinaryOp::Multiply, Expr::i32(a), Expr::i32(b)))
            .unwrap();
        match a.checked_mul(b) {
            Some(product) => prop_assert_eq!(graph.evaluate(&MapContext::new()).unwrap(), product),
            None => {
                let overflowed = matches!(
                    graph.evaluate(&MapContext::new()),
                    Err(RuntimeError::IntegerOverflow { .. })
                );
                prop_assert!(overflowed);
            }
        }
    }
}
