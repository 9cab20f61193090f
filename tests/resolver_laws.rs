// ============================================================================
// SProx - 目标解析性质测试
// ============================================================================

use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

use sprox::core::resolver::{ResolveOptions, Resolver};
use sprox::models::pool::{Pool, TargetRecord};
use sprox::models::target::{ExpressionType, TargetExpression};

const ROLES: [&str; 3] = ["edge", "core", "spine"];

fn pool_of(entries: &[(String, usize)]) -> Pool {
    entries
        .iter()
        .map(|(id, role)| {
            (
                id.clone(),
                TargetRecord::new().with_grains(json!({"role": ROLES[*role]})),
            )
        })
        .collect()
}

fn resolve(pool: &Pool, expression: &str, kind: ExpressionType) -> Vec<String> {
    Resolver::new(ResolveOptions::default())
        .resolve(pool, &TargetExpression::from(expression), kind)
        .into_vec()
}

fn target_entries() -> impl Strategy<Value = Vec<(String, usize)>> {
    prop::collection::btree_map("[a-c]{1,3}[0-9]", 0usize..3, 1..24)
        .prop_map(|map| map.into_iter().collect::<Vec<_>>())
}

proptest! {
    #[test]
    fn glob_result_does_not_depend_on_pool_order(
        shuffled in target_entries().prop_shuffle(),
        pattern in prop::sample::select(vec!["*", "a*", "*1", "?b*", "[ab]*", "c?"]),
    ) {
        let mut sorted = shuffled.clone();
        sorted.sort();

        let a: BTreeSet<String> = resolve(&pool_of(&shuffled), pattern, ExpressionType::Glob).into_iter().collect();
        let b: BTreeSet<String> = resolve(&pool_of(&sorted), pattern, ExpressionType::Glob).into_iter().collect();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn or_not_is_union_with_complement(targets in target_entries(), a in 0usize..3, b in 0usize..3) {
        let pool = pool_of(&targets);
        let expression = format!("G@role:{} or not G@role:{}", ROLES[a], ROLES[b]);

        let expected: Vec<String> = targets
            .iter()
            .filter(|(_, role)| *role == a || *role != b)
            .map(|(id, _)| id.clone())
            .collect();
        prop_assert_eq!(resolve(&pool, &expression, ExpressionType::Compound), expected);
    }

    #[test]
    fn repeated_operand_is_idempotent(targets in target_entries(), role in 0usize..3) {
        let pool = pool_of(&targets);
        let single = format!("G@role:{}", ROLES[role]);
        let base = resolve(&pool, &single, ExpressionType::Compound);

        let and_form = format!("{0} and {0}", single);
        let or_form = format!("( {0} ) or {0}", single);
        prop_assert_eq!(resolve(&pool, &and_form, ExpressionType::Compound), base.clone());
        prop_assert_eq!(resolve(&pool, &or_form, ExpressionType::Compound), base.clone());
        let plain = format!("role:{}", ROLES[role]);
        prop_assert_eq!(resolve(&pool, &plain, ExpressionType::Grain), base);
    }

    #[test]
    fn results_follow_pool_order_without_duplicates(targets in target_entries()) {
        let pool = pool_of(&targets);
        let ids = resolve(&pool, "* or G@role:edge", ExpressionType::Compound);
        let expected: Vec<String> = targets.iter().map(|(id, _)| id.clone()).collect();
        prop_assert_eq!(ids, expected);
    }
}

#[test]
fn malformed_compound_matches_nothing() {
    let pool = pool_of(&[("a1".to_string(), 0), ("b1".to_string(), 1)]);
    for expression in ["a1 b1", "a1 and", "( a1", "a1 )", "( )", "and a1", "X@foo"] {
        assert!(
            resolve(&pool, expression, ExpressionType::Compound).is_empty(),
            "expected no match for {:?}",
            expression
        );
    }
}
