//! Integration tests for index-lookup admission and plan search.

mod common;

use std::sync::Arc;

use keyplan_core::proto::{Operator, Value};
use keyplan_core::{
    Error, IndexLookup, Planner, PlannerConfig, PlanStep, Query, QueryPlan, StepId, StepKind,
    UpdatePlanner, Write, WriteKind,
};

use common::{blog_model, field, BlogIndexes};

fn posts_of_user(model: &keyplan_core::Model) -> Query {
    Query::builder(model, model.key_path("Post", &["user"]).unwrap())
        .select("Post.title")
        .eq("User.id", 5)
        .build()
        .unwrap()
}

fn kinds(plan: &QueryPlan) -> Vec<&'static str> {
    plan.body().iter().map(|step| step.kind.name()).collect()
}

/// Remaining work never grows from a step to its child.
fn assert_narrowing(plan: &QueryPlan) {
    for pair in plan.steps().windows(2) {
        let (parent, child) = (&pair[0].state, &pair[1].state);
        assert!(child.fields.is_subset(&parent.fields));
        assert!(child.eq.is_subset(&parent.eq));
        assert!(child.range.is_none() || child.range == parent.range);
        assert!(child.order_by.len() <= parent.order_by.len());
        assert!(parent.order_by.ends_with(&child.order_by));
    }
}

#[test]
fn test_single_hop_plan() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(
        &model,
        [indexes.by_name.clone(), indexes.posts_by_user.clone(), indexes.user_identity.clone()],
    );
    let query = Arc::new(posts_of_user(&model));

    let plans = planner.find_plans(&query).unwrap();
    assert_eq!(plans.len(), 1);

    let plan = &plans[0];
    assert_eq!(kinds(plan), vec!["lookup"]);
    assert!(plan.is_answered());
    let lookup = plan.body()[0].lookup().unwrap();
    assert_eq!(lookup.index.key(), indexes.posts_by_user.key());
    assert!(lookup.eq_filter.contains(&field(&model, "User.id")));
    assert_eq!(lookup.limit, None);
    assert_eq!(plan.to_string(), format!("lookup({})", indexes.posts_by_user.key()));
}

#[test]
fn test_two_hop_plan() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(
        &model,
        [indexes.by_name.clone(), indexes.posts_by_user.clone(), indexes.user_identity.clone()],
    );
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.name", "A")
            .build()
            .unwrap(),
    );

    let plans = planner.find_plans(&query).unwrap();
    assert_eq!(plans.len(), 1);
    let plan = &plans[0];
    let used: Vec<String> = plan.indexes().iter().map(|i| i.key().to_string()).collect();
    assert_eq!(
        used,
        vec![indexes.by_name.key().to_string(), indexes.posts_by_user.key().to_string()]
    );

    // The second hop is keyed by the ids the first one fetched
    let first = &plan.steps()[1];
    assert!(first.fields.contains(&field(&model, "User.id")));
    assert_eq!(plan.steps()[2].parent, Some(StepId(1)));
    assert_narrowing(plan);
}

#[test]
fn test_identity_lookup_only_at_path_end() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let config = PlannerConfig::default();

    let root = PlanStep::root(Arc::new(posts_of_user(&model)));
    assert!(IndexLookup::admit(&model, &config, StepId(0), &root, &indexes.user_identity).is_none());

    let user_query = Query::builder(&model, model.key_path("User", &[]).unwrap())
        .select("User.name")
        .eq("User.id", 5)
        .build()
        .unwrap();
    let root = PlanStep::root(Arc::new(user_query));
    let step = IndexLookup::admit(&model, &config, StepId(0), &root, &indexes.user_identity).unwrap();
    assert!(step.state.answered(true));
    assert!(step.state.path.is_empty());
}

#[test]
fn test_no_redundant_admission() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let config = PlannerConfig::default();
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.name", "A")
            .build()
            .unwrap(),
    );
    let root = PlanStep::root(Arc::clone(&query));
    let after_name = IndexLookup::admit(&model, &config, StepId(0), &root, &indexes.by_name).unwrap();

    // Keyed correctly, but holds nothing the query still needs
    let ids_only = common::index(&model, &["User.id"], &[], &["Post.id"], "Post", &["user"]);
    assert!(IndexLookup::admit(&model, &config, StepId(1), &after_name, &ids_only).is_none());
    assert!(
        IndexLookup::admit(&model, &config, StepId(1), &after_name, &indexes.posts_by_user).is_some()
    );

    // The same single-entity index cannot be repeated mid-path
    assert!(IndexLookup::admit(&model, &config, StepId(1), &after_name, &indexes.by_name).is_none());
}

#[test]
fn test_lookup_after_ids_must_use_them() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let config = PlannerConfig::default();
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.name", "A")
            .build()
            .unwrap(),
    );
    let root = PlanStep::root(query);
    let after_name = IndexLookup::admit(&model, &config, StepId(0), &root, &indexes.by_name).unwrap();
    assert!(after_name.fields.contains(&field(&model, "User.id")));

    // Both hash keys are known, but the user ids fetched by the parent go unused
    let titles_by_name =
        common::index(&model, &["User.name"], &[], &["Post.id", "Post.title"], "Post", &["user"]);
    let titles_by_both = common::index(
        &model,
        &["User.id", "User.name"],
        &[],
        &["Post.id", "Post.title"],
        "Post",
        &["user"],
    );
    for candidate in [&titles_by_name, &titles_by_both] {
        assert!(IndexLookup::admit(&model, &config, StepId(1), &after_name, candidate).is_none());
    }
    assert!(
        IndexLookup::admit(&model, &config, StepId(1), &after_name, &indexes.posts_by_user).is_some()
    );
}

#[test]
fn test_lookup_must_carry_ids_or_output() {
    let model = blog_model();
    let config = PlannerConfig::default();
    let root = PlanStep::root(Arc::new(posts_of_user(&model)));

    // Dates neither identify posts nor answer the query
    let dates = common::index(&model, &["User.id"], &[], &["Post.date"], "Post", &["user"]);
    assert!(IndexLookup::admit(&model, &config, StepId(0), &root, &dates).is_none());

    let dated_ids =
        common::index(&model, &["User.id"], &[], &["Post.id", "Post.date"], "Post", &["user"]);
    let step = IndexLookup::admit(&model, &config, StepId(0), &root, &dated_ids).unwrap();
    assert!(!step.state.answered(false));
}

#[test]
fn test_sort_resolved_by_lookup() {
    let model = blog_model();
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &[]).unwrap())
            .select("Post.title")
            .eq("Post.id", 1)
            .order_by("Post.date")
            .build()
            .unwrap(),
    );
    let dated = common::index(&model, &["Post.id"], &["Post.date"], &["Post.title"], "Post", &[]);

    let root = PlanStep::root(Arc::clone(&query));
    let step =
        IndexLookup::admit(&model, &PlannerConfig::default(), StepId(0), &root, &dated).unwrap();
    assert_eq!(step.lookup().unwrap().order_by, vec![field(&model, "Post.date")]);
    assert!(step.state.order_by.is_empty());

    let plan = Planner::new(&model, [dated]).min_plan(&query).unwrap();
    assert_eq!(kinds(&plan), vec!["lookup"]);
}

#[test]
fn test_hash_fields_must_be_known() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let query = Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
        .select("Post.title")
        .eq("User.name", "A")
        .build()
        .unwrap();
    let root = PlanStep::root(Arc::new(query));
    let admitted = IndexLookup::admit(
        &model,
        &PlannerConfig::default(),
        StepId(0),
        &root,
        &indexes.posts_by_user,
    );
    assert!(admitted.is_none());
}

#[test]
fn test_range_on_clustering_order() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let query = Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
        .select("Post.title")
        .eq("User.id", 5)
        .range("Post.date", Operator::Gt, Value::Timestamp(15))
        .build()
        .unwrap();
    let root = PlanStep::root(Arc::new(query));
    let step = IndexLookup::admit(
        &model,
        &PlannerConfig::default(),
        StepId(0),
        &root,
        &indexes.posts_by_date,
    )
    .unwrap();

    let lookup = step.lookup().unwrap();
    assert_eq!(lookup.range_filter, Some(field(&model, "Post.date")));
    assert!(step.state.range.is_none());
    assert!(step.state.answered(true));

    // Range selectivity lowers the running estimate but not the per-key one
    assert!((step.state.cardinality - 1.0).abs() < 1e-9);
    assert!((step.state.hash_cardinality - 10.0).abs() < 1e-9);
}

#[test]
fn test_residual_filter_lowers_cardinality() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, [indexes.posts_by_user.clone()]);
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.id", 5)
            .range("Post.date", Operator::Gt, Value::Timestamp(15))
            .build()
            .unwrap(),
    );

    let plan = planner.min_plan(&query).unwrap();
    assert_eq!(kinds(&plan), vec!["lookup", "filter"]);
    let (lookup, filter) = (&plan.steps()[1], &plan.steps()[2]);
    assert!(filter.state.cardinality <= lookup.state.cardinality);
    assert!(matches!(
        &filter.kind,
        StepKind::Filter { eq, range } if eq.is_empty() && *range == Some(field(&model, "Post.date"))
    ));
    assert_narrowing(&plan);
}

#[test]
fn test_residual_sort_then_limit() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, [indexes.posts_by_user.clone()]);
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.id", 5)
            .order_by("Post.date")
            .limit(2)
            .build()
            .unwrap(),
    );

    let plans = planner.find_plans(&query).unwrap();
    assert_eq!(plans.len(), 1);
    assert_eq!(kinds(&plans[0]), vec!["lookup", "sort", "limit"]);
    assert!(plans[0].state().cardinality <= 2.0);
    assert_narrowing(&plans[0]);
}

#[test]
fn test_limit_recorded_on_final_lookup() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, [indexes.posts_by_user.clone()]);
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.id", 5)
            .limit(1)
            .build()
            .unwrap(),
    );

    let plan = planner.min_plan(&query).unwrap();
    assert_eq!(kinds(&plan), vec!["lookup"]);
    assert_eq!(plan.body()[0].lookup().unwrap().limit, Some(1));
    assert_eq!(plan.state().limit, Some(1));
}

#[test]
fn test_cheapest_plan_is_selected() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(
        &model,
        [indexes.posts_by_user.clone(), indexes.posts_by_date.clone()],
    );
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.id", 5)
            .range("Post.date", Operator::Gt, Value::Timestamp(15))
            .build()
            .unwrap(),
    );

    assert_eq!(planner.find_plans(&query).unwrap().len(), 2);
    let best = planner.min_plan(&query).unwrap();
    assert_eq!(kinds(&best), vec!["lookup"]);
    assert_eq!(best.indexes()[0].key(), indexes.posts_by_date.key());
}

#[test]
fn test_no_plan_found() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, [indexes.posts_by_user.clone()]);
    let query = Arc::new(
        Query::builder(&model, model.key_path("Post", &["user"]).unwrap())
            .select("Post.title")
            .eq("User.name", "A")
            .build()
            .unwrap(),
    );

    match planner.find_plans(&query) {
        Err(Error::NoPlanFound(description)) => {
            assert!(description.contains("User.name"));
        }
        other => panic!("expected NoPlanFound, got {:?}", other),
    }
}

#[test]
fn test_update_plans_per_index() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(
        &model,
        [indexes.by_name.clone(), indexes.user_identity.clone()],
    );
    let write = Arc::new(
        Write::builder(&model, WriteKind::Update, "User")
            .set("User.name", "Z")
            .eq("User.id", 5)
            .build()
            .unwrap(),
    );

    let plans = UpdatePlanner::new(&planner).find_plans(&write).unwrap();
    assert_eq!(plans.len(), 2);
    for plan in &plans {
        assert!(plan.requires_delete());
        assert!(plan.requires_insert());
        assert_eq!(plan.support_plans().len(), 1);
        let support = plan.support_plans()[0].query();
        assert!(support.select().contains(&field(&model, "User.name")));
    }
}

#[test]
fn test_multi_entity_index_needs_explicit_support() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, [indexes.posts_by_user.clone()]);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Update, "Post")
            .set("Post.title", "T")
            .eq("Post.id", 1)
            .build()
            .unwrap(),
    );

    let result = UpdatePlanner::new(&planner).find_plans(&write);
    assert!(matches!(result, Err(Error::InvalidStatement(_))));
}

#[test]
fn test_insert_needs_no_support() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planner = Planner::new(&model, indexes.all());
    let write = Arc::new(
        Write::builder(&model, WriteKind::Insert, "User")
            .set("User.id", 9)
            .set("User.name", "N")
            .build()
            .unwrap(),
    );

    let updater = UpdatePlanner::new(&planner);
    let affected = updater.affected_indexes(&write);
    // Every index on a path through User
    assert_eq!(affected.len(), 5);

    let plan = updater
        .plan_index(&write, indexes.by_name.clone(), &[])
        .unwrap();
    assert!(!plan.requires_delete());
    assert!(plan.support_plans().is_empty());
}
