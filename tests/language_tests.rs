// Language behaviour tests
//
// Programs are evaluated end to end with output captured in a BufferSink.

use kestrel::error::{ErrorKind, KestrelError, Position};
use kestrel::{interpret, interpret_with_config, parse_source, BufferSink, Config, Evaluator};

/// Runs a program and returns everything it printed.
fn run(source: &str) -> Result<String, KestrelError> {
    let mut sink = BufferSink::new();
    interpret(source, &mut sink)?;
    Ok(sink.output().to_string())
}

fn output(source: &str) -> String {
    run(source).unwrap_or_else(|error| panic!("{:?} failed: {}", source, error))
}

fn error(source: &str) -> KestrelError {
    match run(source) {
        Ok(out) => panic!("{:?} should have failed, printed {:?}", source, out),
        Err(error) => error,
    }
}

/// Display form of the value of the last statement.
fn eval(source: &str) -> String {
    let result = (|| -> Result<String, KestrelError> {
        let program = parse_source(source)?;
        let mut sink = BufferSink::new();
        let mut evaluator = Evaluator::new(&mut sink, Config::default());
        let value = evaluator.evaluate_program(&program)?;
        Ok(value.map(|v| v.to_string()).unwrap_or_default())
    })();
    result.unwrap_or_else(|error| panic!("evaluation failed: {}", error))
}

/// Display form of a root binding after running `source`.
fn global(source: &str, name: &str) -> String {
    let mut sink = BufferSink::new();
    match interpret(source, &mut sink) {
        Ok(environment) => match environment.global(name) {
            Some(value) => value.to_string(),
            None => panic!("no global binding"),
        },
        Err(error) => panic!("evaluation failed: {}", error),
    }
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_exact_arithmetic() {
    assert_eq!(global("a = 10^2 / 10;", "a"), "10");
    assert_eq!(global("a = 20 * 0.5;", "a"), "10");
    assert_eq!(eval("0.1 + 0.2 = 0.3"), "true");
    assert_eq!(eval("7 / 2"), "3.5");
    assert_eq!(eval("1 / 3"), "0.33333333333333333333");
}

#[test]
fn test_operator_precedence() {
    assert_eq!(eval("1 + 2 * 3"), "7");
    assert_eq!(eval("(1 + 2) * 3"), "9");
    assert_eq!(eval("2 ^ 3 ^ 2"), "512");
    assert_eq!(eval("2 * 3 ^ 2"), "18");
    assert_eq!(eval("10 - 4 - 3"), "3");
    assert_eq!(eval("1 + 1 = 2 && 3 > 2"), "true");
    assert_eq!(eval("false && true || true"), "true");
}

#[test]
fn test_unary_signs() {
    assert_eq!(eval("-3"), "-3");
    assert_eq!(eval("1 -- 2"), "3");
    assert_eq!(eval("x = 4; -x"), "-4");
    assert_eq!(eval("2 ^ -1"), "0.5");
    assert_eq!(eval("+5"), "5");
}

#[test]
fn test_arithmetic_errors() {
    assert_eq!(error("1 / 0").kind, ErrorKind::ArithmeticError);
    assert_eq!(error("2 ^ 0.5").kind, ErrorKind::ArithmeticError);
    assert_eq!(error("0 ^ -1").kind, ErrorKind::ArithmeticError);
}

#[test]
fn test_mismatched_operands() {
    let err = error("1 + true");
    assert_eq!(
        err.kind,
        ErrorKind::MismatchedMethod {
            operator: "+".to_string(),
            left: "Num",
            right: "Bool",
        }
    );
    assert!(err.message.contains("not defined for Num and Bool"));

    assert!(matches!(error("true < false").kind, ErrorKind::MismatchedMethod { .. }));
    assert!(matches!(error("[1] - [1]").kind, ErrorKind::MismatchedMethod { .. }));
    assert!(matches!(error("1 && true").kind, ErrorKind::MismatchedMethod { .. }));
}

// ============================================================================
// Characters, strings and lists
// ============================================================================

#[test]
fn test_char_arithmetic() {
    assert_eq!(eval("'a' + 1 = 'b'"), "true");
    assert_eq!(eval("'b' - 1 = 'a'"), "true");
    assert_eq!(eval("'b' - '!' = 'A'"), "true");
    assert_eq!(eval("1 + 'a' = 'b'"), "true");
    assert_eq!(eval("'a' < 'b'"), "true");
    assert_eq!(error("'a' - 200").kind, ErrorKind::ArithmeticError);
}

#[test]
fn test_list_semantics() {
    assert_eq!(eval("[1] + [2] = [1, 2]"), "true");
    assert_eq!(eval("[1, 2](0)"), "1");
    assert_eq!(eval("xs = [5, 6, 7]; xs(2)"), "7");
    assert_eq!(error("[1, 2](2)").kind, ErrorKind::IndexError);
    assert_eq!(error("[1, 2](0.5)").kind, ErrorKind::IndexError);
    assert_eq!(error("[1, 2](-1)").kind, ErrorKind::IndexError);
    assert_eq!(eval("[[1, 2], [3]]"), "[[1, 2], [3]]");
    assert_eq!(eval("[]"), "[]");
}

#[test]
fn test_strings_are_char_lists() {
    assert_eq!(output("println(\"hello\");"), "hello\n");
    assert_eq!(output("println(\"ab\" + \"cd\");"), "abcd\n");
    assert_eq!(output("s = \"abc\"; println(s(1));"), "b\n");
    assert_eq!(eval("\"ab\" = ['a', 'b']"), "true");
    assert_eq!(eval("[1, 'x']"), "[1, 'x']");
    assert_eq!(output("println(\"tab\\there\");"), "tab\there\n");
}

#[test]
fn test_index_assignment_rebinds_copy() {
    let out = output("xs = [1, 2, 3]; ys = xs; xs{1} = 20; println(xs); println(ys);");
    assert_eq!(out, "[1, 20, 3]\n[1, 2, 3]\n");
    assert_eq!(error("xs = [1]; xs{3} = 0;").kind, ErrorKind::IndexError);
    assert_eq!(error("zs{0} = 1;").kind, ErrorKind::ContextError);
}

// ============================================================================
// Scoping and closures
// ============================================================================

#[test]
fn test_closure_reaches_outer_function() {
    let source = "outside a = a(5)+outsideTwo(5); outsideTwo a = a+5; c = outside(lambda a -> a+3);";
    assert_eq!(global(source, "c"), "18");
}

#[test]
fn test_assignment_mutates_outer_binding() {
    let source = "counter = 0; bump n = { counter = counter + n; counter }; bump(2); bump(3);";
    assert_eq!(global(source, "counter"), "5");
    assert_eq!(output("x = 1; { x = 2; x } println(x);"), "2\n");
}

#[test]
fn test_block_locals_do_not_escape() {
    let err = error("{ inner = 1; inner }\ninner;");
    assert_eq!(err.kind, ErrorKind::ContextError);
    assert!(err.message.contains("inner"));
}

#[test]
fn test_closure_keeps_defining_scope() {
    assert_eq!(eval("make n = lambda x -> x + n; add5 = make(5); add5(10)"), "15");

    let source = "
        make start = { count = start; lambda -> { count = count + 1; count } };
        next = make(10);
        next();
        next();
        println(next());
    ";
    assert_eq!(output(source), "13\n");
}

#[test]
fn test_curried_calls() {
    assert_eq!(eval("adder a = func b -> a + b; adder(1)(2)"), "3");
}

#[test]
fn test_overloading_by_arity() {
    let source = "area r = r * r; area w h = w * h; println(area(3)); println(area(2, 5));";
    assert_eq!(output(source), "9\n10\n");

    let err = error("f x = x; f(1, 2);");
    assert_eq!(err.kind, ErrorKind::ParseError);
    assert!(err.message.contains("No overload"));
}

#[test]
fn test_lambda_arity_mismatch() {
    assert_eq!(error("g = lambda x -> x; g(1, 2);").kind, ErrorKind::ParseError);
}

#[test]
fn test_undefined_names() {
    assert_eq!(error("x + 1").kind, ErrorKind::ContextError);
    assert_eq!(error("nope(1)").kind, ErrorKind::ContextError);
}

#[test]
fn test_if_requires_boolean() {
    assert_eq!(eval("if 3 < 4 1 else 2"), "1");
    assert_eq!(eval("n = 3; if n = 0 (1) else 2"), "2");
    let err = error("if 1 2 else 3");
    assert!(matches!(err.kind, ErrorKind::MismatchedMethod { ref operator, .. } if operator == "if"));
}

#[test]
fn test_return_is_block_result() {
    assert_eq!(eval("double x = { y = x * 2; return y }; double(4)"), "8");
}

// ============================================================================
// Recursion
// ============================================================================

#[test]
fn test_fibonacci() {
    let mut source = String::from("f a = if a = 0 0 else if a = 1 1 else f (a-1) + f (a-2);");
    for n in 0..8 {
        source.push_str(&format!(" println(f({}));", n));
    }
    assert_eq!(output(&source), "0\n1\n1\n2\n3\n5\n8\n13\n");
}

#[test]
fn test_deep_recursion_within_default_limit() {
    let source = "sum n = if n = 0 0 else n + sum(n - 1); println(sum(100)); println(sum(1000));";
    assert_eq!(output(source), "5050\n500500\n");
}

#[test]
fn test_runaway_recursion_is_fatal() {
    let err = error("f a = if a = 0 0 else if a = 1 1 else f (a-1) + f (a-2); f(-1);");
    assert_eq!(err.kind, ErrorKind::RecursionLimitExceeded);
    assert!(err.is_fatal());
}

#[test]
fn test_call_depth_is_configurable() {
    let source = "down n = if n = 0 0 else down(n - 1); down(20);";
    let mut sink = BufferSink::new();
    let result = interpret_with_config(source, &mut sink, Config::default().with_max_call_depth(10));
    assert_eq!(result.map(|_| ()).map_err(|e| e.kind), Err(ErrorKind::RecursionLimitExceeded));

    assert!(run(source).is_ok());
    assert!(run("down n = if n = 0 0 else down(n - 1); down(5000);").is_ok());
}

// ============================================================================
// Data types
// ============================================================================

#[test]
fn test_record_requires_exact_fields() {
    let decl = "datatype Rectangle = {width, height};";
    assert!(run(&format!("{} r = new Rectangle(width=5,height=6);", decl)).is_ok());

    let missing = error(&format!("{} r = new Rectangle(width=5);", decl));
    assert_eq!(missing.kind, ErrorKind::ParseError);
    assert!(missing.message.contains("height"));

    let extra = error(&format!("{} r = new Rectangle(width=5,height=6,depth=7);", decl));
    assert_eq!(extra.kind, ErrorKind::ParseError);
    assert!(extra.message.contains("depth"));
}

#[test]
fn test_constructor_tags() {
    let decl = "datatype Rectangle = Rect{width,height} | Square{size}; r = new Rectangle.Rect(width=1,height=2);";
    assert_eq!(eval(&format!("{} r isa Rectangle$Rect", decl)), "true");
    assert_eq!(eval(&format!("{} r isa Rectangle", decl)), "true");
    assert_eq!(eval(&format!("{} r isa Rectangle$Square", decl)), "false");
    assert_eq!(eval(&format!("{} 3 isa Rectangle", decl)), "false");
    assert_eq!(eval(&format!("{} r", decl)), "Rectangle$Rect{width = 1, height = 2}");
}

#[test]
fn test_isa_builtin_kinds() {
    assert_eq!(eval("3 isa Num"), "true");
    assert_eq!(eval("'c' isa Char"), "true");
    assert_eq!(eval("\"text\" isa List"), "true");
    assert_eq!(eval("(lambda x -> x) isa Func"), "true");
    assert_eq!(eval("true isa Num"), "false");
    assert_eq!(error("3 isa Missing").kind, ErrorKind::ContextError);
    assert_eq!(error("datatype T = A{} | B{}; 3 isa T$C").kind, ErrorKind::ContextError);
}

#[test]
fn test_construction_errors() {
    let decl = "datatype Shape = Circle{radius} | Square{size};";
    assert_eq!(error(&format!("{} new Shape(radius = 1)", decl)).kind, ErrorKind::ParseError);
    assert_eq!(error(&format!("{} new Shape.Triangle()", decl)).kind, ErrorKind::ContextError);
    assert_eq!(error("new Unknown(x = 1)").kind, ErrorKind::ContextError);
    assert_eq!(error("datatype P = {x}; datatype P = {y};").kind, ErrorKind::ParseError);
}

#[test]
fn test_field_access_and_mutation() {
    let source = "
        datatype Box = {v};
        datatype Pair = {left, right};
        a = new Box(v = 1);
        b = a;
        b.v = 5;
        println(a.v);
        p = new Pair(left = new Box(v = 1), right = 2);
        p.left.v = 9;
        println(p.left.v);
    ";
    assert_eq!(output(source), "5\n9\n");

    let through_index = "datatype Box = {v}; xs = [new Box(v = 1)]; xs(0).v = 9; println(xs(0).v);";
    assert_eq!(output(through_index), "9\n");

    let through_call = "
        datatype Box = {v};
        shared = new Box(v = 1);
        get x = shared;
        get(0).v = 7;
        println(shared.v);
    ";
    assert_eq!(output(through_call), "7\n");

    assert_eq!(eval("datatype Box = {v}; a = new Box(v = 1); (a.v = 1) && true"), "true");

    assert_eq!(error("datatype Box = {v}; a = new Box(v = 1); a.w;").kind, ErrorKind::ContextError);
    assert_eq!(error("datatype Box = {v}; a = new Box(v = 1); a.w = 2;").kind, ErrorKind::ContextError);
    assert_eq!(error("x = 3; x.v = 2;").kind, ErrorKind::ContextError);
}

#[test]
fn test_type_names_are_immutable() {
    let err = error("datatype Point = {x, y}; Point = 3;");
    assert_eq!(err.kind, ErrorKind::ContextError);
    assert_eq!(eval("datatype Point = {x, y}; Point"), "<type Point>");
}

#[test]
fn test_structural_equality_of_instances() {
    let decl = "datatype Point = {x, y};";
    assert_eq!(eval(&format!("{} new Point(x = 1, y = 2) = new Point(y = 2, x = 1)", decl)), "true");
    assert_eq!(eval(&format!("{} new Point(x = 1, y = 2) = new Point(x = 2, y = 1)", decl)), "false");
}

// ============================================================================
// Library
// ============================================================================

#[test]
fn test_println_returns_its_argument() {
    assert_eq!(output("x = println(42); println(x + 1);"), "42\n43\n");
}

#[test]
fn test_higher_order_builtins() {
    assert_eq!(output("double x = x * 2; println(map(double, [1, 2, 3]));"), "[2, 4, 6]\n");
    assert_eq!(eval("foldl(lambda acc, x -> acc + x, 0, [1, 2, 3, 4])"), "10");
    assert_eq!(output("foreach(println, [1, 2]);"), "1\n2\n");
    assert_eq!(eval("foreach(func x -> x, [7])"), "[7]");
}

#[test]
fn test_list_builtins() {
    assert_eq!(eval("length(\"hello\")"), "5");
    assert_eq!(eval("length([])"), "0");
    assert_eq!(eval("in(3, [1, 2, 3])"), "true");
    assert_eq!(eval("in('z', \"abc\")"), "false");
    assert!(matches!(error("length(3)").kind, ErrorKind::MismatchedMethod { .. }));
    assert!(matches!(error("map(1, [1])").kind, ErrorKind::MismatchedMethod { .. }));
}

#[test]
fn test_conversion_builtins() {
    assert_eq!(output("println(toString(42) + \"!\");"), "42!\n");
    assert_eq!(eval("typeOf(1)"), "<type Num>");
    assert_eq!(
        eval("datatype Shape = Circle{r} | Dot{}; typeOf(new Shape.Circle(r = 1))"),
        "<type Shape$Circle>"
    );
    assert_eq!(eval("typeOf('a') = typeOf('b')"), "true");
}

#[test]
fn test_builtins_print_values() {
    assert_eq!(eval("println"), "<builtin println/1>");
    assert_eq!(eval("sq x = x * x"), "<func sq/1>");
}

// ============================================================================
// Front end
// ============================================================================

#[test]
fn test_reparse_is_idempotent() {
    let source = "datatype S = A{x} | B{}; f n = if n isa Num n * 2 else 0; y = [f(1), 'c'](0); { z = \"s\"; z }";
    let first = parse_source(source).expect("first parse");
    let second = parse_source(source).expect("second parse");
    assert_eq!(first, second);
}

#[test]
fn test_lex_error_has_position() {
    let err = error("x = 1;\ny = @;");
    assert_eq!(err.kind, ErrorKind::LexError);
    assert_eq!(err.position, Some(Position { line: 2, column: 5 }));
    assert!(err.to_string().ends_with("at 2:5"));
}

#[test]
fn test_parse_error_stops_before_evaluation() {
    let mut sink = BufferSink::new();
    let result = interpret("println(1); x = ;", &mut sink).map(|_| ());
    assert_eq!(result.map_err(|e| e.kind), Err(ErrorKind::ParseError));
    assert_eq!(sink.output(), "");
}
