//! End-to-end analysis scenarios: literal IR in, conditions and query out.

use gametime::{
    analyze_path, AnalyzerConfig, AnalyzerError, AnalyzerWarning, ArrayModel, CType, CmpKind,
    Endianness, Expr, FunctionUnitBuilder, GametimeError, Op, ValueOp,
};
use std::sync::Arc;

fn int32() -> CType {
    CType::int(32)
}

#[test]
fn empty_path_yields_single_true_condition() {
    let mut b = FunctionUnitBuilder::new("empty");
    let b0 = b.add_block();
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let path = &analyzed.path;
    assert_eq!(path.conditions.len(), 1);
    assert!(path.conditions[0].expr.is_true());
    assert_eq!(path.conditions[0].block, b0);
    assert!(path.array_dimensions.is_empty());

    let smt = analyzed.query.smt();
    assert!(smt.starts_with("(set-logic QF_AUFBV)\n"));
    assert!(smt.contains("(declare-fun gtCONSTRAINT0 () Bool)"));
    assert!(smt.contains("(assert (= gtCONSTRAINT0 true))"));
    assert!(smt.contains("(assert (and gtCONSTRAINT0))"));
    assert!(smt.ends_with("(check-sat)\n(exit)\n"));
}

#[test]
fn constant_divisor_keeps_its_guard() {
    // y = x / 4 on a 32-bit machine: the guard is emitted even though the
    // divisor is a literal constant.
    let mut b = FunctionUnitBuilder::new("div");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    let y = b.var("y", int32());
    let four = b.int_imm(4, int32());
    b.value_instr(b0, ValueOp::Div, y, vec![x, four], 2);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let conditions: Vec<String> = analyzed
        .path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(conditions, vec!["(y<1> == (x / 4))", "(4 != 0)"]);

    let smt = analyzed.query.smt();
    assert!(smt.contains("(bvsdiv x (_ bv4 32))"));
    assert!(smt.contains("(declare-fun y<1> () (_ BitVec 32))"));
    assert!(smt.contains("(declare-fun x () (_ BitVec 32))"));
}

#[test]
fn fixed_array_access_is_bounded_and_anchored() {
    // y = p[i] with p: int[8], i a 32-bit variable.
    let mut b = FunctionUnitBuilder::new("subscript");
    let b0 = b.add_block();
    let p = b.var("p", CType::array(int32(), Some(8)));
    let i = b.var("i", int32());
    let y = b.var("y", int32());
    let t = b.temp("t1", int32());
    b.value_instr(b0, ValueOp::Subscript, t, vec![p, i], 4);
    b.value_instr(b0, ValueOp::Assign, y, vec![t], 4);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let conditions: Vec<String> = analyzed
        .path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(
        conditions,
        vec![
            "(y<1> == select(p, __gtINDEX0))",
            "(__gtINDEX0 == i)",
            "((0 <= __gtINDEX0) && (__gtINDEX0 < 8))",
        ]
    );
    assert_eq!(
        analyzed.path.array_dimensions.get("p"),
        Some(&vec![32, 32])
    );
    assert_eq!(analyzed.path.array_accesses, vec![("p".to_string(), vec![0])]);
    assert_eq!(
        analyzed.path.temporary_index_expressions.get(&0),
        Some(&Expr::variable("i", 32))
    );
    assert!(analyzed.query.smt().contains("(select p __gtINDEX0)"));
}

#[test]
fn address_taken_variable_promotes_to_temporary_pointer() {
    // int x; int *p = &x; *p = 7;
    let mut b = FunctionUnitBuilder::new("addr");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    let ax = b.addr_of(x, 32);
    let p = b.var("p", CType::pointer(int32(), 32));
    b.value_instr(b0, ValueOp::Assign, p, vec![ax], 2);
    let m = b.memory(p, 0, int32());
    let seven = b.int_imm(7, int32());
    b.value_instr(b0, ValueOp::Assign, m, vec![seven], 3);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let path = &analyzed.path;

    let x_leaf = Expr::variable("x", 32);
    let pointer = path.address_taken.get(&x_leaf).expect("x promoted");
    assert_eq!(pointer.value(), Some("__gtPTR0"));

    let conditions: Vec<String> = path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    // The synthesized *p_tmp = x equality at the address-taking point, then
    // the store resolved through the alias table — not through the pointer.
    assert_eq!(conditions[0], "(select(__gtPTR0, __gtINDEX0) == x)");
    assert_eq!(conditions[1], "(x<1> == 7)");
    assert_eq!(conditions[2], "(__gtINDEX0 == 0)");
    assert!(analyzed
        .query
        .smt()
        .contains("(= x<1> (_ bv7 32))"));
}

fn two_field_struct() -> CType {
    CType::aggregate(Arc::new(gametime::AggregateType {
        name: "S".to_string(),
        bits: 32,
        is_union: false,
        fields: vec![
            gametime::Field {
                name: "a".to_string(),
                ty: CType::int(16),
                bit_offset: 0,
            },
            gametime::Field {
                name: "b".to_string(),
                ty: CType::int(16),
                bit_offset: 16,
            },
        ],
    }))
}

fn word_access_of_struct(endianness: Endianness) -> String {
    // y = *(int *)ps where ps points at struct S { short a; short b; }.
    let mut b = FunctionUnitBuilder::new("agg");
    let b0 = b.add_block();
    let ps = b.var("ps", CType::pointer(two_field_struct(), 32));
    let y = b.var("y", int32());
    let m = b.memory(ps, 0, int32());
    b.value_instr(b0, ValueOp::Assign, y, vec![m], 5);
    let unit = b.finish();
    let config = AnalyzerConfig::builder().endianness(endianness).build();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let cond = &analyzed.path.conditions[0].expr;
    assert_eq!(cond.op(), Op::Eq);
    let rhs = cond.get_parameter(1);
    assert_eq!(rhs.op(), Op::Concat);
    assert_eq!(rhs.bits(), 32);
    rhs.value_string()
}

#[test]
fn aggregate_word_access_orders_fields_by_endianness() {
    // After post-processing the field arrays are selected at a shared
    // carrier temporary.
    let little = word_access_of_struct(Endianness::Little);
    assert!(
        little.starts_with("(select(gtFIELD_b_gtAGG_S, "),
        "little-endian puts the high-offset field first: {little}"
    );
    assert!(little.contains("++ select(gtFIELD_a_gtAGG_S, "));

    let big = word_access_of_struct(Endianness::Big);
    assert!(
        big.starts_with("(select(gtFIELD_a_gtAGG_S, "),
        "big-endian puts the low-offset field first: {big}"
    );
    assert!(big.contains("++ select(gtFIELD_b_gtAGG_S, "));
}

#[test]
fn branch_directions_reflect_the_taken_edges() {
    // Two conditional branches: the first taken true, the second false.
    let mut b = FunctionUnitBuilder::new("branches");
    let b0 = b.add_block();
    let b1 = b.add_block();
    let b2 = b.add_block();
    let b3 = b.add_block();
    let b4 = b.add_block();

    let x = b.var("x", int32());
    let y = b.var("y", int32());
    let ten = b.int_imm(10, int32());
    let five = b.int_imm(5, int32());
    let t1 = b.temp("t1", int32());
    let t2 = b.temp("t2", int32());

    b.compare_instr(b0, CmpKind::Lt, t1, x, ten, 3);
    b.branch_instr(b0, t1, b1, b3, 3);
    b.compare_instr(b1, CmpKind::Lt, t2, y, five, 5);
    b.branch_instr(b1, t2, b2, b4, 5);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0, b1, b4]).unwrap();
    let path = &analyzed.path;
    let conditions: Vec<String> = path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(conditions, vec!["(x < 10)", "(! (y < 5))"]);
    assert_eq!(path.conditions[0].block, b0);
    assert_eq!(path.conditions[0].branch, Some(true));
    assert_eq!(path.conditions[1].block, b1);
    assert_eq!(path.conditions[1].branch, Some(false));

    let mut edges = Vec::new();
    path.dump_condition_edges(&mut edges, |b| b.index() as i64, |b| b.index() as i64)
        .unwrap();
    assert_eq!(String::from_utf8(edges).unwrap(), "0: 0 1\n1: 1 4\n");

    let mut directions = Vec::new();
    path.dump_branch_directions(&mut directions).unwrap();
    assert_eq!(String::from_utf8(directions).unwrap(), "3: True\n5: False\n");
}

#[test]
fn pointer_arithmetic_resolves_to_array_access() {
    // q = p + i; y = *q;  becomes a select of p at index i.
    let mut b = FunctionUnitBuilder::new("ptr");
    let b0 = b.add_block();
    let p = b.var("p", CType::pointer(int32(), 32));
    let i = b.var("i", int32());
    let q = b.var("q", CType::pointer(int32(), 32));
    let y = b.var("y", int32());
    b.value_instr(b0, ValueOp::Add, q, vec![p, i], 2);
    let m = b.memory(q, 0, int32());
    b.value_instr(b0, ValueOp::Assign, y, vec![m], 3);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let conditions: Vec<String> = analyzed
        .path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(
        conditions,
        vec!["(y<1> == select(p, __gtINDEX0))", "(__gtINDEX0 == i)"]
    );
    // The pointer assignment itself produced an alias entry, not a
    // condition.
    assert!(analyzed
        .path
        .alias_table
        .contains_key(&Expr::array_variable("q", 32)));
}

#[test]
fn store_through_pointer_bumps_array_version() {
    // t = p + i; *t = 7;
    let mut b = FunctionUnitBuilder::new("store");
    let b0 = b.add_block();
    let p = b.var("p", CType::pointer(int32(), 32));
    let i = b.var("i", int32());
    let t = b.temp("t1", CType::pointer(int32(), 32));
    b.value_instr(b0, ValueOp::Add, t, vec![p, i], 2);
    let m = b.memory(t, 0, int32());
    let seven = b.int_imm(7, int32());
    b.value_instr(b0, ValueOp::Assign, m, vec![seven], 3);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let conditions: Vec<String> = analyzed
        .path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(
        conditions,
        vec![
            "(p<1> == store(p, __gtINDEX0, 7))",
            "(__gtINDEX0 == i)"
        ]
    );
    assert!(analyzed
        .query
        .smt()
        .contains("(store p __gtINDEX0 (_ bv7 32))"));
}

#[test]
fn two_dimensional_access_flat_mode() {
    // y = p[i][j] with p: int(*)[4], flat array modelling.
    let mut b = FunctionUnitBuilder::new("matrix");
    let b0 = b.add_block();
    let row = CType::array(int32(), Some(4));
    let p = b.var("p", CType::pointer(row.clone(), 32));
    let i = b.var("i", int32());
    let j = b.var("j", int32());
    let y = b.var("y", int32());
    let t1 = b.temp("t1", row);
    let t2 = b.temp("t2", int32());
    b.value_instr(b0, ValueOp::Subscript, t1, vec![p, i], 2);
    b.value_instr(b0, ValueOp::Subscript, t2, vec![t1, j], 2);
    b.value_instr(b0, ValueOp::Assign, y, vec![t2], 2);
    let unit = b.finish();
    let config = AnalyzerConfig::builder()
        .array_model(ArrayModel::Flat)
        .build();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    assert_eq!(
        analyzed.path.array_dimensions.get("p"),
        Some(&vec![32, 32, 32])
    );
    assert_eq!(
        analyzed.path.array_accesses,
        vec![("p".to_string(), vec![0, 1])]
    );
    let smt = analyzed.query.smt();
    assert!(smt.contains("(declare-fun p () (Array (_ BitVec 64) (_ BitVec 32)))"));
    assert!(smt.contains("(select p (concat __gtINDEX0 __gtINDEX1))"));
    // The second level is fixed-size, so its temporary is bounded.
    assert!(analyzed
        .path
        .conditions
        .iter()
        .any(|c| c.expr.value_string() == "((0 <= __gtINDEX1) && (__gtINDEX1 < 4))"));
}

#[test]
fn assume_annotation_becomes_nonzero_condition() {
    let mut b = FunctionUnitBuilder::new("assume");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    b.call_instr(b0, "gt_assume", None, vec![x], 7);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    assert_eq!(
        analyzed.path.conditions[0].expr.value_string(),
        "(x != 0)"
    );
}

#[test]
fn simulate_annotation_is_recorded_not_asserted() {
    let mut b = FunctionUnitBuilder::new("simulate");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    b.call_instr(b0, "gt_simulate", None, vec![x], 7);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    assert_eq!(analyzed.path.simulated, vec![Expr::variable("x", 32)]);
    // Nothing but the fallback condition was asserted.
    assert_eq!(analyzed.path.conditions.len(), 1);
    assert!(analyzed.path.conditions[0].expr.is_true());
}

#[test]
fn external_call_value_is_one_symbol_per_site() {
    // y = f(x) at line 9: y's value is the symbolic gtEFC_f@9.
    let mut b = FunctionUnitBuilder::new("efc");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    let y = b.var("y", int32());
    b.call_instr(b0, "f", Some(y), vec![x], 9);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    assert_eq!(
        analyzed.path.conditions[0].expr.value_string(),
        "(y<1> == gtEFC_f@9)"
    );
}

#[test]
fn phi_takes_the_latest_on_path_source() {
    let mut b = FunctionUnitBuilder::new("phi");
    let b0 = b.add_block();
    let b1 = b.add_block();
    let b2 = b.add_block();
    let three = b.int_imm(3, int32());
    let four = b.int_imm(4, int32());
    let ta = b.temp("ta", int32());
    let tb = b.temp("tb", int32());
    let tc = b.temp("tc", int32());
    let y = b.var("y", int32());
    b.value_instr(b0, ValueOp::Assign, ta, vec![three], 2);
    b.goto_instr(b0, b2, 2);
    b.value_instr(b1, ValueOp::Assign, tb, vec![four], 3);
    b.goto_instr(b1, b2, 3);
    b.phi_instr(b2, tc, vec![(ta, b0), (tb, b1)], 4);
    b.value_instr(b2, ValueOp::Assign, y, vec![tc], 4);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0, b2]).unwrap();
    assert_eq!(
        analyzed.path.conditions[0].expr.value_string(),
        "(y<1> == 3)"
    );
}

#[test]
fn switch_instruction_is_a_fatal_input_error() {
    let mut b = FunctionUnitBuilder::new("switch");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    b.switch_instr(b0, x, 2);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let err = analyze_path(&unit, &config, &[b0]).unwrap_err();
    assert!(matches!(
        err,
        GametimeError::Analyzer(AnalyzerError::SwitchInstruction { .. })
    ));
}

#[test]
fn float_immediate_truncates_with_warning() {
    let mut b = FunctionUnitBuilder::new("float");
    let b0 = b.add_block();
    let y = b.var("y", int32());
    let f = b.float_imm(2.75, CType::float(32));
    b.value_instr(b0, ValueOp::Assign, y, vec![f], 2);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    assert_eq!(
        analyzed.path.conditions[0].expr.value_string(),
        "(y<1> == 2)"
    );
    assert!(analyzed
        .path
        .warnings
        .iter()
        .any(|w| matches!(w, AnalyzerWarning::FloatTruncated { truncated: 2, .. })));
}

#[test]
fn divisor_guard_appears_exactly_once_per_divisor() {
    // Two divisions by the same constant share one guard.
    let mut b = FunctionUnitBuilder::new("guards");
    let b0 = b.add_block();
    let x = b.var("x", int32());
    let y = b.var("y", int32());
    let z = b.var("z", int32());
    let four = b.int_imm(4, int32());
    let four2 = b.int_imm(4, int32());
    b.value_instr(b0, ValueOp::Div, y, vec![x, four], 2);
    b.value_instr(b0, ValueOp::Rem, z, vec![x, four2], 3);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0]).unwrap();
    let guards: Vec<&gametime::Condition> = analyzed
        .path
        .conditions
        .iter()
        .filter(|c| c.expr.value_string() == "(4 != 0)")
        .collect();
    assert_eq!(guards.len(), 1);
}

#[test]
fn reassignment_versions_flow_into_later_blocks() {
    // b0: x = x + 1;  b1: branch on x — the condition sees x<1>.
    let mut b = FunctionUnitBuilder::new("versions");
    let b0 = b.add_block();
    let b1 = b.add_block();
    let b2 = b.add_block();
    let b3 = b.add_block();
    let x = b.var("x", int32());
    let one = b.int_imm(1, int32());
    let zero = b.int_imm(0, int32());
    let t = b.temp("t1", int32());
    b.value_instr(b0, ValueOp::Add, x, vec![x, one], 2);
    b.goto_instr(b0, b1, 2);
    b.compare_instr(b1, CmpKind::Gt, t, x, zero, 3);
    b.branch_instr(b1, t, b2, b3, 3);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0, b1, b2]).unwrap();
    let conditions: Vec<String> = analyzed
        .path
        .conditions
        .iter()
        .map(|c| c.expr.value_string())
        .collect();
    assert_eq!(conditions, vec!["(x<1> == (x + 1))", "(x<1> > 0)"]);
}

#[test]
fn sidecar_dumps_are_written() {
    let mut b = FunctionUnitBuilder::new("dumps");
    let b0 = b.add_block();
    let b1 = b.add_block();
    let b2 = b.add_block();
    let x = b.var("x", int32());
    let zero = b.int_imm(0, int32());
    let t = b.temp("t1", int32());
    b.compare_instr(b0, CmpKind::Ge, t, x, zero, 11);
    b.branch_instr(b0, t, b1, b2, 11);
    let unit = b.finish();
    let config = AnalyzerConfig::default();

    let analyzed = analyze_path(&unit, &config, &[b0, b1]).unwrap();
    let path = &analyzed.path;

    let dir = tempfile::tempdir().unwrap();
    let conditions_path = dir.path().join("conditions.txt");
    let mut file = std::fs::File::create(&conditions_path).unwrap();
    path.dump_conditions(&mut file).unwrap();
    let text = std::fs::read_to_string(&conditions_path).unwrap();
    assert_eq!(text, "(x >= 0)\n");

    let mut lines = Vec::new();
    path.dump_line_numbers(&mut lines).unwrap();
    assert_eq!(String::from_utf8(lines).unwrap(), "11\n");
}
