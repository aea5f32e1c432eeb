//! End-to-end evaluation scenarios against the mock runtime context.

use std::time::Duration;

use pretty_assertions::assert_eq;

use vela_core::Span;
use vela_eval::ast::{
    BinaryOp, BindingEnv, Expr, ExprKind, IncDecOp, Literal, LocalBinding, UnaryOp,
};
use vela_eval::{
    EvalError, EvalOptions, EvaluationEngine, EvaluationResult, RuntimeFailure,
};
use vela_jdi::{
    ContextError, FieldDescriptor, JavaType, MethodDescriptor, MockRuntimeContext, Value,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn expr(kind: ExprKind) -> Expr {
    Expr::new(kind, Span::new(0, 0))
}

fn int(v: i32) -> Expr {
    expr(ExprKind::Literal(Literal::Int(v)))
}

fn long(v: i64) -> Expr {
    expr(ExprKind::Literal(Literal::Long(v)))
}

fn double(v: f64) -> Expr {
    expr(ExprKind::Literal(Literal::Double(v)))
}

fn boolean(v: bool) -> Expr {
    expr(ExprKind::Literal(Literal::Boolean(v)))
}

fn character(c: char) -> Expr {
    expr(ExprKind::Literal(Literal::Char(c)))
}

fn string(s: &str) -> Expr {
    expr(ExprKind::Literal(Literal::String(s.to_string())))
}

fn null() -> Expr {
    expr(ExprKind::Literal(Literal::Null))
}

fn name(n: &str) -> Expr {
    expr(ExprKind::Name(n.to_string()))
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    expr(ExprKind::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn unary(op: UnaryOp, operand: Expr) -> Expr {
    expr(ExprKind::Unary {
        op,
        operand: Box::new(operand),
    })
}

fn assign(target: Expr, value: Expr) -> Expr {
    expr(ExprKind::Assign {
        target: Box::new(target),
        op: None,
        value: Box::new(value),
    })
}

fn compound(target: Expr, op: BinaryOp, value: Expr) -> Expr {
    expr(ExprKind::Assign {
        target: Box::new(target),
        op: Some(op),
        value: Box::new(value),
    })
}

fn field(receiver: Expr, field_name: &str) -> Expr {
    expr(ExprKind::FieldAccess {
        receiver: Box::new(receiver),
        name: field_name.to_string(),
    })
}

fn element(array: Expr, index: Expr) -> Expr {
    expr(ExprKind::ArrayAccess {
        array: Box::new(array),
        index: Box::new(index),
    })
}

fn call(receiver: Option<Expr>, method: &str, args: Vec<Expr>) -> Expr {
    expr(ExprKind::MethodCall {
        receiver: receiver.map(Box::new),
        name: method.to_string(),
        args,
    })
}

fn conditional(condition: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
    expr(ExprKind::Conditional {
        condition: Box::new(condition),
        then_branch: Box::new(then_branch),
        else_branch: Box::new(else_branch),
    })
}

fn cast(ty: JavaType, inner: Expr) -> Expr {
    expr(ExprKind::Cast {
        ty,
        expr: Box::new(inner),
    })
}

fn engine(mock: MockRuntimeContext) -> EvaluationEngine<MockRuntimeContext> {
    init_tracing();
    EvaluationEngine::new(mock)
}

fn eval_ok(
    engine: &mut EvaluationEngine<MockRuntimeContext>,
    expression: &Expr,
    env: &BindingEnv,
) -> Value {
    let result = engine.evaluate_sync(expression, env);
    assert_eq!(result.error, None);
    result.value.expect("evaluation produced no value")
}

fn eval_err(
    engine: &mut EvaluationEngine<MockRuntimeContext>,
    expression: &Expr,
    env: &BindingEnv,
) -> EvalError {
    let result = engine.evaluate_sync(expression, env);
    assert_eq!(result.value, None);
    result.error.expect("evaluation unexpectedly succeeded")
}

fn env_with_int_local(name: &str, slot: u16) -> BindingEnv {
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(name, slot, JavaType::Int));
    env
}

#[test]
fn one_plus_two_is_three() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let sum = binary(BinaryOp::Add, int(1), int(2));
    assert_eq!(eval_ok(&mut engine, &sum, &env), Value::Int(3));
}

#[test]
fn literal_round_trip_keeps_type_and_payload() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    assert_eq!(eval_ok(&mut engine, &long(42), &env), Value::Long(42));
    assert_eq!(
        eval_ok(&mut engine, &string("hi"), &env),
        Value::String("hi".to_string())
    );
    assert_eq!(eval_ok(&mut engine, &boolean(true), &env), Value::Boolean(true));
    assert_eq!(eval_ok(&mut engine, &null(), &env), Value::Null);
}

#[test]
fn string_concatenation_with_int() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let concat = binary(BinaryOp::Add, string("a"), int(1));
    assert_eq!(
        eval_ok(&mut engine, &concat, &env),
        Value::String("a1".to_string())
    );
}

#[test]
fn string_concatenation_renders_floats_like_java() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let concat = binary(BinaryOp::Add, string("x"), double(1.0));
    assert_eq!(
        eval_ok(&mut engine, &concat, &env),
        Value::String("x1.0".to_string())
    );
}

#[test]
fn assignment_writes_through_and_yields_the_value() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(5));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let increment = assign(name("x"), binary(BinaryOp::Add, name("x"), int(1)));
    assert_eq!(eval_ok(&mut engine, &increment, &env), Value::Int(6));
    assert_eq!(engine.context_mut().local(0), Some(&Value::Int(6)));
}

#[test]
fn array_length_reads_the_debuggee() {
    let mut mock = MockRuntimeContext::new();
    let array = mock.insert_array(
        JavaType::Int,
        vec![Value::Int(1), Value::Int(2), Value::Int(3)],
    );
    mock.set_local(0, Value::Array(array));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(
        "arr",
        0,
        JavaType::array(JavaType::Int),
    ));

    let length = field(name("arr"), "length");
    assert_eq!(eval_ok(&mut engine, &length, &env), Value::Int(3));
}

#[test]
fn remote_exception_is_the_evaluation_outcome() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    let npe = mock.thrown_exception("java.lang.NullPointerException");
    mock.queue_invocation("fail", Err(npe));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));
    env.methods.push(MethodDescriptor::new(
        "Foo",
        "fail",
        vec![],
        JavaType::Void,
        false,
    ));

    let err = eval_err(&mut engine, &call(Some(name("o")), "fail", vec![]), &env);
    match err {
        EvalError::Runtime(RuntimeFailure::RemoteException { exception }) => {
            assert_eq!(exception.type_name(), "java.lang.NullPointerException");
        }
        other => panic!("expected a remote exception, got {other:?}"),
    }
}

#[test]
fn short_circuit_and_performs_no_remote_operation() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(1));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let and = binary(
        BinaryOp::AndAnd,
        boolean(false),
        binary(BinaryOp::Eq, name("x"), int(1)),
    );
    assert_eq!(eval_ok(&mut engine, &and, &env), Value::Boolean(false));
    assert!(engine.context_mut().calls.is_empty());
}

#[test]
fn short_circuit_or_skips_the_right_operand() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(1));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let or = binary(
        BinaryOp::OrOr,
        boolean(true),
        binary(BinaryOp::Eq, name("x"), int(1)),
    );
    assert_eq!(eval_ok(&mut engine, &or, &env), Value::Boolean(true));
    assert!(engine.context_mut().calls.is_empty());
}

#[test]
fn conditional_does_not_evaluate_the_untaken_branch() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(1));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let pick = conditional(boolean(true), int(1), name("x"));
    assert_eq!(eval_ok(&mut engine, &pick, &env), Value::Int(1));
    assert!(engine.context_mut().calls.is_empty());
}

#[test]
fn conditional_branches_meet_at_the_promoted_type() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let pick = conditional(boolean(false), int(1), long(2));
    assert_eq!(eval_ok(&mut engine, &pick, &env), Value::Long(2));
}

#[test]
fn side_effect_free_evaluation_is_idempotent() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(5));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let sum = binary(BinaryOp::Add, name("x"), int(1));
    let first = eval_ok(&mut engine, &sum, &env);
    let second = eval_ok(&mut engine, &sum, &env);
    assert_eq!(first, second);
    assert_eq!(engine.context_mut().local(0), Some(&Value::Int(5)));
}

#[test]
fn numeric_promotion_widens_to_long() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let sum = binary(BinaryOp::Add, int(1), long(2));
    assert_eq!(eval_ok(&mut engine, &sum, &env), Value::Long(3));
}

#[test]
fn char_operands_promote_to_int() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let sum = binary(BinaryOp::Add, character('a'), int(1));
    assert_eq!(eval_ok(&mut engine, &sum, &env), Value::Int(98));
}

#[test]
fn integer_division_by_zero_fails() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let division = binary(BinaryOp::Div, int(1), int(0));
    assert_eq!(
        eval_err(&mut engine, &division, &env),
        EvalError::Runtime(RuntimeFailure::DivisionByZero)
    );
}

#[test]
fn comparisons_and_unary_operators() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    assert_eq!(
        eval_ok(&mut engine, &binary(BinaryOp::Gt, int(2), int(1)), &env),
        Value::Boolean(true)
    );
    assert_eq!(
        eval_ok(&mut engine, &binary(BinaryOp::Lt, double(1.5), int(2)), &env),
        Value::Boolean(true)
    );
    assert_eq!(
        eval_ok(&mut engine, &unary(UnaryOp::Neg, int(5)), &env),
        Value::Int(-5)
    );
    assert_eq!(
        eval_ok(&mut engine, &unary(UnaryOp::Not, boolean(true)), &env),
        Value::Boolean(false)
    );
    assert_eq!(
        eval_ok(&mut engine, &unary(UnaryOp::BitNot, int(0)), &env),
        Value::Int(-1)
    );
}

#[test]
fn casts_narrow_like_java() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    assert_eq!(
        eval_ok(&mut engine, &cast(JavaType::Int, double(3.9)), &env),
        Value::Int(3)
    );
    assert_eq!(
        eval_ok(&mut engine, &cast(JavaType::Byte, int(300)), &env),
        Value::Byte(44)
    );
}

#[test]
fn compound_assignment_narrows_back_to_the_target_type() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Byte(5));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new("b", 0, JavaType::Byte));

    let add = compound(name("b"), BinaryOp::Add, int(3));
    assert_eq!(eval_ok(&mut engine, &add, &env), Value::Byte(8));
    assert_eq!(engine.context_mut().local(0), Some(&Value::Byte(8)));
}

#[test]
fn postfix_increment_yields_the_old_value() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(5));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let post = expr(ExprKind::PostfixIncDec {
        op: IncDecOp::Inc,
        target: Box::new(name("x")),
    });
    assert_eq!(eval_ok(&mut engine, &post, &env), Value::Int(5));
    assert_eq!(engine.context_mut().local(0), Some(&Value::Int(6)));
}

#[test]
fn prefix_increment_yields_the_new_value() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Int(5));
    let mut engine = engine(mock);
    let env = env_with_int_local("x", 0);

    let pre = expr(ExprKind::PrefixIncDec {
        op: IncDecOp::Inc,
        target: Box::new(name("x")),
    });
    assert_eq!(eval_ok(&mut engine, &pre, &env), Value::Int(6));
    assert_eq!(engine.context_mut().local(0), Some(&Value::Int(6)));
}

#[test]
fn instance_field_reads_and_writes_go_through_this() {
    let mut mock = MockRuntimeContext::new();
    let this = mock.insert_object("Main");
    mock.set_this(this.clone());
    mock.set_field(Some(this.id), "count", Value::Int(1));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.fields
        .push(FieldDescriptor::new("Main", "count", JavaType::Int, false));

    let bump = compound(name("count"), BinaryOp::Add, int(6));
    assert_eq!(eval_ok(&mut engine, &bump, &env), Value::Int(7));
    assert_eq!(
        engine.context_mut().field(Some(this.id), "count"),
        Some(&Value::Int(7))
    );
}

#[test]
fn static_fields_need_no_receiver() {
    let mut mock = MockRuntimeContext::new();
    mock.set_field(None, "MAX", Value::Int(99));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.has_this = false;
    env.fields
        .push(FieldDescriptor::new("Main", "MAX", JavaType::Int, true));

    assert_eq!(eval_ok(&mut engine, &name("MAX"), &env), Value::Int(99));
}

#[test]
fn this_in_a_static_frame_is_the_receiving_type() {
    let mut mock = MockRuntimeContext::new();
    let mirror = mock.set_receiving_type("Main");
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.has_this = false;

    let this = expr(ExprKind::This);
    assert_eq!(eval_ok(&mut engine, &this, &env), Value::Object(mirror));
}

#[test]
fn array_element_assignment_writes_through() {
    let mut mock = MockRuntimeContext::new();
    let array = mock.insert_array(JavaType::Int, vec![Value::Int(0), Value::Int(0)]);
    mock.set_local(0, Value::Array(array.clone()));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(
        "arr",
        0,
        JavaType::array(JavaType::Int),
    ));

    let store = assign(element(name("arr"), int(1)), int(7));
    assert_eq!(eval_ok(&mut engine, &store, &env), Value::Int(7));
    assert_eq!(
        engine.context_mut().array_contents(array.id),
        Some(&[Value::Int(0), Value::Int(7)][..])
    );
}

#[test]
fn array_compound_assignment_reads_once() {
    let mut mock = MockRuntimeContext::new();
    let array = mock.insert_array(JavaType::Int, vec![Value::Int(1)]);
    mock.set_local(0, Value::Array(array.clone()));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(
        "arr",
        0,
        JavaType::array(JavaType::Int),
    ));

    let bump = compound(element(name("arr"), int(0)), BinaryOp::Add, int(1));
    assert_eq!(eval_ok(&mut engine, &bump, &env), Value::Int(2));
    let reads = engine
        .context_mut()
        .calls
        .iter()
        .filter(|call| call.starts_with("read_array_element"))
        .count();
    assert_eq!(reads, 1);
}

#[test]
fn out_of_bounds_access_surfaces_the_thrown_exception() {
    let mut mock = MockRuntimeContext::new();
    let array = mock.insert_array(JavaType::Int, vec![Value::Int(1)]);
    mock.set_local(0, Value::Array(array));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(
        "arr",
        0,
        JavaType::array(JavaType::Int),
    ));

    let err = eval_err(&mut engine, &element(name("arr"), int(9)), &env);
    match err {
        EvalError::Runtime(RuntimeFailure::RemoteException { exception }) => {
            assert_eq!(
                exception.type_name(),
                "java.lang.ArrayIndexOutOfBoundsException"
            );
        }
        other => panic!("expected a thrown exception, got {other:?}"),
    }
}

#[test]
fn null_array_access_is_a_null_pointer_failure() {
    let mut mock = MockRuntimeContext::new();
    mock.set_local(0, Value::Null);
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals.push(LocalBinding::new(
        "arr",
        0,
        JavaType::array(JavaType::Int),
    ));

    assert_eq!(
        eval_err(&mut engine, &field(name("arr"), "length"), &env),
        EvalError::Runtime(RuntimeFailure::NullPointer)
    );
}

#[test]
fn constructors_allocate_in_the_debuggee() {
    let mut engine = engine(MockRuntimeContext::new());
    let mut env = BindingEnv::new("Main");
    env.constructors.push(MethodDescriptor::new(
        "Foo",
        "<init>",
        vec![],
        JavaType::reference("Foo"),
        false,
    ));

    let new_foo = expr(ExprKind::New {
        type_name: "Foo".to_string(),
        args: vec![],
    });
    match eval_ok(&mut engine, &new_foo, &env) {
        Value::Object(object) => assert_eq!(object.runtime_type, "Foo"),
        other => panic!("expected an object, got {other:?}"),
    }
}

#[test]
fn array_allocation_reports_its_length() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let new_array = expr(ExprKind::NewArray {
        element_type: JavaType::Int,
        dimensions: vec![int(3)],
    });
    match eval_ok(&mut engine, &new_array, &env) {
        Value::Array(array) => {
            assert_eq!(
                engine.context_mut().array_contents(array.id).map(<[Value]>::len),
                Some(3)
            );
        }
        other => panic!("expected an array, got {other:?}"),
    }
}

#[test]
fn instance_method_results_push_their_value() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    mock.queue_invocation("next", Ok(Value::Int(42)));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));
    env.methods.push(MethodDescriptor::new(
        "Foo",
        "next",
        vec![],
        JavaType::Int,
        false,
    ));

    let next = call(Some(name("o")), "next", vec![]);
    assert_eq!(eval_ok(&mut engine, &next, &env), Value::Int(42));
}

#[test]
fn void_methods_yield_void() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    mock.queue_invocation("run", Ok(Value::Void));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));
    env.methods.push(MethodDescriptor::new(
        "Foo",
        "run",
        vec![],
        JavaType::Void,
        false,
    ));

    let run = call(Some(name("o")), "run", vec![]);
    assert_eq!(eval_ok(&mut engine, &run, &env), Value::Void);
}

#[test]
fn object_operands_of_concatenation_use_remote_to_string() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    mock.queue_invocation("toString", Ok(Value::String("Foo!".to_string())));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));

    let concat = binary(BinaryOp::Add, string("x"), name("o"));
    assert_eq!(
        eval_ok(&mut engine, &concat, &env),
        Value::String("xFoo!".to_string())
    );
}

#[test]
fn reference_equality_compares_identity() {
    let mut mock = MockRuntimeContext::new();
    let object = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(object));
    let mut engine = engine(mock);
    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));

    assert_eq!(
        eval_ok(&mut engine, &binary(BinaryOp::Eq, name("o"), name("o")), &env),
        Value::Boolean(true)
    );
    assert_eq!(
        eval_ok(&mut engine, &binary(BinaryOp::Eq, name("o"), null()), &env),
        Value::Boolean(false)
    );
}

#[test]
fn remote_timeout_aborts_the_evaluation() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    mock.queue_invocation("slow", Err(ContextError::Timeout));
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));
    env.methods.push(MethodDescriptor::new(
        "Foo",
        "slow",
        vec![],
        JavaType::Int,
        false,
    ));

    assert_eq!(
        eval_err(&mut engine, &call(Some(name("o")), "slow", vec![]), &env),
        EvalError::Runtime(RuntimeFailure::Timeout)
    );
}

#[test]
fn lost_context_aborts_the_evaluation() {
    let mut mock = MockRuntimeContext::new();
    let receiver = mock.insert_object("Foo");
    mock.set_local(0, Value::Object(receiver));
    mock.queue_invocation(
        "m",
        Err(ContextError::ContextLost("debuggee resumed".to_string())),
    );
    let mut engine = engine(mock);

    let mut env = BindingEnv::new("Main");
    env.locals
        .push(LocalBinding::new("o", 0, JavaType::reference("Foo")));
    env.methods
        .push(MethodDescriptor::new("Foo", "m", vec![], JavaType::Int, false));

    let err = eval_err(&mut engine, &call(Some(name("o")), "m", vec![]), &env);
    assert!(matches!(
        err,
        EvalError::Runtime(RuntimeFailure::ContextLost(_))
    ));
}

#[test]
fn expired_deadline_times_the_evaluation_out() {
    let mock = MockRuntimeContext::new();
    init_tracing();
    let mut engine = EvaluationEngine::with_options(
        mock,
        EvalOptions {
            timeout: Some(Duration::ZERO),
        },
    );
    let env = BindingEnv::new("Main");
    assert_eq!(
        eval_err(&mut engine, &binary(BinaryOp::Add, int(1), int(2)), &env),
        EvalError::Runtime(RuntimeFailure::Timeout)
    );
}

#[test]
fn cancellation_stops_the_evaluation_and_still_reports() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    engine.cancel_token().cancel();

    let mut reports = Vec::new();
    let mut listener = |result: EvaluationResult| reports.push(result);
    engine.evaluate(&binary(BinaryOp::Add, int(1), int(2)), &env, &mut listener);

    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].error,
        Some(EvalError::Runtime(RuntimeFailure::Cancelled))
    );

    // a cleared engine evaluates again
    engine.clear_cancellation();
    assert_eq!(
        eval_ok(&mut engine, &binary(BinaryOp::Add, int(1), int(2)), &env),
        Value::Int(3)
    );
}

#[test]
fn listener_fires_exactly_once_on_success_and_failure() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");

    let mut reports = Vec::new();
    let mut listener = |result: EvaluationResult| reports.push(result);

    engine.evaluate(&binary(BinaryOp::Add, int(1), int(2)), &env, &mut listener);
    engine.evaluate(&name("missing"), &env, &mut listener);

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].value, Some(Value::Int(3)));
    assert!(reports[1].has_error());
}

#[test]
fn concatenated_strings_compare_by_contents() {
    let mut engine = engine(MockRuntimeContext::new());
    let env = BindingEnv::new("Main");
    let equal = binary(
        BinaryOp::Eq,
        binary(BinaryOp::Add, string("a"), int(1)),
        string("a1"),
    );
    assert_eq!(eval_ok(&mut engine, &equal, &env), Value::Boolean(true));
}
