//! Integration tests for writes and the support-query protocol.

mod common;

use std::sync::Arc;

use keyplan_core::plan::SupportQueries;
use keyplan_core::proto::{Operator, Value};
use keyplan_core::statement::conditions;
use keyplan_core::{
    Backend, Condition, Conditions, Error, ExecutionConfig, FieldSetting, Index, MemoryBackend,
    Model, PlanRegistry, Planner, Query, Row, StatementRunner, SupportStrategy, UpdatePlanner,
    Write, WriteKind,
};

use common::{blog_model, field, load, row, BlogIndexes};

fn user_by_name(model: &Model) -> Query {
    Query::builder(model, model.key_path("User", &[]).unwrap())
        .select("User.id")
        .param("User.name", Operator::Eq)
        .build()
        .unwrap()
}

/// Registry with plans for `write` and the user-by-name lookup.
fn user_registry(model: &Model, indexes: &BlogIndexes, write: &Arc<Write>) -> Arc<PlanRegistry> {
    let planner = Planner::new(model, [indexes.by_name.clone(), indexes.user_identity.clone()]);
    let registry = PlanRegistry::new();
    registry.register_update(write, UpdatePlanner::new(&planner).find_plans(write).unwrap());
    registry.register_query(planner.min_plan(&Arc::new(user_by_name(model))).unwrap());
    Arc::new(registry)
}

fn ids_named<B: Backend>(runner: &StatementRunner<'_, B>, model: &Model, name: &str) -> Vec<Value> {
    let bound = conditions([Condition::eq(field(model, "User.name"), name)]);
    let id = field(model, "User.id");
    runner
        .query(&user_by_name(model), &bound)
        .unwrap()
        .into_iter()
        .filter_map(|mut row| row.remove(&id))
        .collect()
}

#[test]
fn test_insert_writes_settings() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Insert, "User")
            .set("User.id", 7)
            .set("User.name", "G")
            .build()
            .unwrap(),
    );
    let registry = user_registry(&model, &indexes, &write);
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    for update in runner.prepare_update(&write).unwrap().iter() {
        assert_eq!(update.strategy(), SupportStrategy::None);
    }
    runner.update(&write, &[], &Conditions::new()).unwrap();

    assert_eq!(ids_named(&runner, &model, "G"), vec![Value::Int(7)]);
    assert_eq!(runner.backend().entry_count(&indexes.user_identity), 3);
}

#[test]
fn test_update_replaces_entries() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Update, "User")
            .set("User.name", "Z")
            .eq("User.id", 5)
            .build()
            .unwrap(),
    );
    let registry = user_registry(&model, &indexes, &write);
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    for update in runner.prepare_update(&write).unwrap().iter() {
        assert_eq!(update.strategy(), SupportStrategy::Independent);
    }
    runner.update(&write, &[], &Conditions::new()).unwrap();

    assert!(ids_named(&runner, &model, "A").is_empty());
    assert_eq!(ids_named(&runner, &model, "Z"), vec![Value::Int(5)]);
    assert_eq!(runner.backend().entry_count(&indexes.by_name), 2);

    let stored = runner
        .backend()
        .fetch(
            &indexes.user_identity,
            indexes.user_identity.all_fields(),
            &[Condition::eq(field(&model, "User.id"), 5)],
        )
        .unwrap();
    assert_eq!(
        stored,
        vec![row(&model, &[("User.id", Value::Int(5)), ("User.name", Value::from("Z"))])]
    );
}

#[test]
fn test_update_with_bound_parameters() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Update, "User")
            .set_param("User.name")
            .param("User.id", Operator::Eq)
            .build()
            .unwrap(),
    );
    let registry = user_registry(&model, &indexes, &write);
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    let name = field(&model, "User.name");
    let id = field(&model, "User.id");
    runner
        .update(
            &write,
            &[FieldSetting::new(name, "Q")],
            &conditions([Condition::eq(id, 6)]),
        )
        .unwrap();

    assert_eq!(ids_named(&runner, &model, "Q"), vec![Value::Int(6)]);
    assert!(ids_named(&runner, &model, "B").is_empty());
    assert_eq!(ids_named(&runner, &model, "A"), vec![Value::Int(5)]);
}

#[test]
fn test_delete_removes_entries() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Delete, "User")
            .eq("User.id", 5)
            .build()
            .unwrap(),
    );
    let registry = user_registry(&model, &indexes, &write);
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    runner.update(&write, &[], &Conditions::new()).unwrap();

    assert!(ids_named(&runner, &model, "A").is_empty());
    assert_eq!(ids_named(&runner, &model, "B"), vec![Value::Int(6)]);
    assert_eq!(runner.backend().entry_count(&indexes.user_identity), 1);
}

#[test]
fn test_delete_without_matches_is_a_no_op() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Delete, "User")
            .eq("User.id", 42)
            .build()
            .unwrap(),
    );
    let registry = user_registry(&model, &indexes, &write);
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    runner.update(&write, &[], &Conditions::new()).unwrap();
    assert_eq!(runner.backend().entry_count(&indexes.by_name), 2);
    assert_eq!(runner.backend().entry_count(&indexes.user_identity), 2);
}

/// Post ids by author, then owner and date per post id.
fn chained_support(model: &Model) -> Vec<Arc<Query>> {
    let ids = Query::builder(model, model.key_path("Post", &[]).unwrap())
        .select("Post.id")
        .param("Post.user", Operator::Eq)
        .build()
        .unwrap();
    let owner = Query::builder(model, model.key_path("Post", &["user"]).unwrap())
        .select("User.id")
        .select("Post.date")
        .param("Post.id", Operator::Eq)
        .build()
        .unwrap();
    vec![Arc::new(ids), Arc::new(owner)]
}

fn retitle_write(model: &Model) -> Arc<Write> {
    Arc::new(
        Write::builder(model, WriteKind::Update, "Post")
            .set("Post.title", "T")
            .eq("Post.user", 5)
            .build()
            .unwrap(),
    )
}

fn post_registry(
    model: &Model,
    indexes: &BlogIndexes,
    write: &Arc<Write>,
    support: Vec<Arc<Query>>,
) -> Arc<PlanRegistry> {
    let planner = Planner::new(
        model,
        [
            indexes.posts_by_user.clone(),
            indexes.post_ids_by_fk.clone(),
            indexes.post_owner.clone(),
        ],
    );
    let mut queries = SupportQueries::new();
    queries.insert(indexes.posts_by_user.key().to_string(), support);
    let plans = UpdatePlanner::new(&planner)
        .find_plans_with_support(write, &queries)
        .unwrap();
    assert_eq!(plans.len(), 1);

    let registry = PlanRegistry::new();
    registry.register_update(write, plans);
    Arc::new(registry)
}

fn posts_of(backend: &dyn Backend, model: &Model, index: &Index, user: i64) -> Vec<Row> {
    let post_id = field(model, "Post.id");
    let mut rows = backend
        .fetch(index, index.all_fields(), &[Condition::eq(field(model, "User.id"), user)])
        .unwrap();
    rows.sort_by(|a, b| a[&post_id].sort_cmp(&b[&post_id]));
    rows
}

#[test]
fn test_chained_support_updates_each_post() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = retitle_write(&model);
    let registry = post_registry(&model, &indexes, &write, chained_support(&model));
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    let prepared = runner.prepare_update(&write).unwrap();
    assert_eq!(
        prepared[0].strategy(),
        SupportStrategy::Chained { id_field: field(&model, "Post.id") }
    );
    runner.update(&write, &[], &Conditions::new()).unwrap();

    let title = field(&model, "Post.title");
    let date = field(&model, "Post.date");
    let rows = posts_of(runner.backend(), &model, &indexes.posts_by_user, 5);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row[&title] == Value::from("T")));
    // Values read through support queries survive the rewrite
    assert_eq!(rows[0][&date], Value::Timestamp(30));
    assert_eq!(rows[1][&date], Value::Timestamp(10));

    let others = posts_of(runner.backend(), &model, &indexes.posts_by_user, 6);
    assert_eq!(others[0][&title], Value::from("Z"));
}

#[test]
fn test_chained_support_parallel_matches_sequential() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = retitle_write(&model);

    let mut results = Vec::new();
    for parallel in [false, true] {
        let registry = post_registry(&model, &indexes, &write, chained_support(&model));
        let backend = MemoryBackend::new();
        load(&backend, &model, &indexes);
        let config = ExecutionConfig::default().with_parallel_support(parallel);
        let runner = StatementRunner::with_config(&model, backend, registry, config);

        runner.update(&write, &[], &Conditions::new()).unwrap();
        results.push(posts_of(runner.backend(), &model, &indexes.posts_by_user, 5));
    }
    assert_eq!(results[0], results[1]);
}

/// Owner and date of one post, read by two queries keyed on the post id.
fn independent_support(model: &Model) -> Vec<Arc<Query>> {
    let owner = Query::builder(model, model.key_path("Post", &["user"]).unwrap())
        .select("User.id")
        .param("Post.id", Operator::Eq)
        .build()
        .unwrap();
    let date = Query::builder(model, model.key_path("Post", &["user"]).unwrap())
        .select("Post.date")
        .param("Post.id", Operator::Eq)
        .build()
        .unwrap();
    vec![Arc::new(owner), Arc::new(date)]
}

#[test]
fn test_independent_support_merges_results() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = Arc::new(
        Write::builder(&model, WriteKind::Update, "Post")
            .set("Post.title", "T")
            .eq("Post.id", 1)
            .build()
            .unwrap(),
    );
    let registry = post_registry(&model, &indexes, &write, independent_support(&model));
    let backend = MemoryBackend::new();
    load(&backend, &model, &indexes);
    let runner = StatementRunner::new(&model, backend, registry);

    let prepared = runner.prepare_update(&write).unwrap();
    assert_eq!(prepared[0].strategy(), SupportStrategy::Independent);
    assert_eq!(prepared[0].support_queries().len(), 2);

    // Owner and date come from separate queries, the post id from the write
    let resolved = prepared[0]
        .resolve(runner.backend(), &[], write.conditions())
        .unwrap();
    assert_eq!(
        resolved.support,
        vec![row(
            &model,
            &[
                ("User.id", Value::Int(5)),
                ("Post.date", Value::Timestamp(30)),
                ("Post.id", Value::Int(1)),
            ]
        )]
    );

    runner.update(&write, &[], &Conditions::new()).unwrap();

    let title = field(&model, "Post.title");
    let date = field(&model, "Post.date");
    let rows = posts_of(runner.backend(), &model, &indexes.posts_by_user, 5);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0][&title], Value::from("T"));
    assert_eq!(rows[0][&date], Value::Timestamp(30));
    assert_eq!(rows[1][&title], Value::from("Y"));
}

#[test]
fn test_chained_support_requires_id_condition() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let write = retitle_write(&model);
    let ids = chained_support(&model).remove(0);
    let registry = post_registry(&model, &indexes, &write, vec![ids.clone(), ids]);
    let runner = StatementRunner::new(&model, MemoryBackend::new(), registry);

    assert!(matches!(
        runner.prepare_update(&write),
        Err(Error::InvalidStatement(_))
    ));
}

#[test]
fn test_unplanned_write() {
    let model = blog_model();
    let indexes = BlogIndexes::new(&model);
    let planned = retitle_write(&model);
    let registry = post_registry(&model, &indexes, &planned, chained_support(&model));
    let runner = StatementRunner::new(&model, MemoryBackend::new(), registry);

    let other = Write::builder(&model, WriteKind::Delete, "Post")
        .eq("Post.id", 1)
        .build()
        .unwrap();
    assert!(matches!(
        runner.update(&other, &[], &Conditions::new()),
        Err(Error::PlanNotFound(_))
    ));
}
