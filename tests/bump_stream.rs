use std::io::Write;
use std::sync::Arc;

use bump_core::{
    Error, ExpressionType, MemorySource, Record, RecordSource, SortOrder, StreamContext,
    StreamExpression,
};
use bump_stream::{drain, BumpConfig, BumpStream, StreamFactory, SummaryRecord};
use document_store::{MemoryConnector, MemoryStore, StoreError, WriterRegistry};
use serde_json::{json, Value};

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| [("id", json!(format!("doc-{i}")))].into_iter().collect())
        .collect()
}

fn bump(store: &MemoryStore, batch_size: usize, input: Vec<Record>) -> BumpStream {
    let config = BumpConfig::new("products", "mem://local", batch_size).unwrap();
    BumpStream::new(
        config,
        Box::new(MemorySource::new(input)),
        Arc::new(MemoryConnector::new(store.clone())),
    )
}

fn summary(record: &Record) -> (usize, i64, u64) {
    let summary = SummaryRecord::from_record(record).expect("summary record");
    (
        summary.batch_applied_count,
        summary.cumulative_applied_count,
        summary.batch_sequence_number,
    )
}

async fn collect(source: &mut dyn RecordSource) -> Vec<Record> {
    let mut out = Vec::new();
    drain(source, |record| out.push(record)).await.unwrap();
    out
}

#[tokio::test]
async fn test_seven_records_in_batches_of_three() {
    let store = MemoryStore::new();
    let mut stream = bump(&store, 3, records(7));
    stream.open().await.unwrap();

    assert_eq!(summary(&stream.read().await.unwrap()), (3, 3, 1));
    assert_eq!(summary(&stream.read().await.unwrap()), (3, 6, 2));
    assert_eq!(summary(&stream.read().await.unwrap()), (1, 7, 3));
    assert!(stream.read().await.unwrap().is_eof());
    stream.close().await.unwrap();

    assert_eq!(store.batch_sizes(), vec![3, 3, 1]);
    assert_eq!(store.batch_collections(), vec!["products"; 3]);
    assert_eq!(store.document_count("products"), 7);
    for i in 0..7 {
        assert_eq!(
            store.counter("products", &json!(format!("doc-{i}")), "bump"),
            Some(1)
        );
    }
}

#[tokio::test]
async fn test_empty_upstream_never_writes() {
    let store = MemoryStore::new();
    let mut stream = bump(&store, 5, vec![]);
    stream.open().await.unwrap();

    assert!(stream.read().await.unwrap().is_eof());
    stream.close().await.unwrap();
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn test_second_write_fails() {
    let store = MemoryStore::new();
    store.fail_call(
        2,
        StoreError::Server {
            code: Some(11600),
            message: "interrupted at shutdown".to_string(),
        },
    );
    let mut stream = bump(&store, 2, records(4));
    stream.open().await.unwrap();

    assert_eq!(summary(&stream.read().await.unwrap()), (2, 2, 1));

    let err = stream.read().await.unwrap_err();
    assert!(err.is_write_failure());
    let message = err.to_string();
    assert!(message.contains("products"), "{message}");
    assert!(message.contains("server"), "{message}");
    assert!(message.contains("interrupted at shutdown"), "{message}");
    assert_eq!(stream.total_bumped(), 2);
    assert_eq!(stream.batch_number(), 1);
    assert_eq!(store.document_count("products"), 2);

    // The retained batch goes out again on the next read.
    assert_eq!(summary(&stream.read().await.unwrap()), (2, 4, 2));
    assert!(stream.read().await.unwrap().is_eof());
    stream.close().await.unwrap();
}

#[tokio::test]
async fn test_missing_identifier_is_sent_as_null() {
    let store = MemoryStore::new();
    let input = vec![
        Record::from_json(json!({"id": "a"})).unwrap(),
        Record::from_json(json!({"name": "no id here"})).unwrap(),
    ];
    let mut stream = bump(&store, 10, input);

    let out = collect(&mut stream).await;
    assert_eq!(out.len(), 1);
    assert_eq!(summary(&out[0]), (2, 2, 1));
    assert_eq!(store.counter("products", &Value::Null, "bump"), Some(1));
    assert_eq!(store.counter("products", &json!("a"), "bump"), Some(1));
}

#[tokio::test]
async fn test_strict_identifier_rejects_record_and_continues() {
    let store = MemoryStore::new();
    let config = BumpConfig::new("products", "mem://local", 10)
        .unwrap()
        .with_require_identifier(true);
    let input = vec![
        Record::from_json(json!({"id": "a"})).unwrap(),
        Record::from_json(json!({"sku": "x"})).unwrap(),
        Record::from_json(json!({"id": "b"})).unwrap(),
    ];
    let mut stream = BumpStream::new(
        config,
        Box::new(MemorySource::new(input)),
        Arc::new(MemoryConnector::new(store.clone())),
    );
    stream.open().await.unwrap();

    let err = stream.read().await.unwrap_err();
    assert!(matches!(err, Error::InvalidRecord(_)));
    assert_eq!(stream.pending_len(), 1);

    assert_eq!(summary(&stream.read().await.unwrap()), (2, 2, 1));
    assert!(stream.read().await.unwrap().is_eof());
    stream.close().await.unwrap();
}

#[tokio::test]
async fn test_summary_count_is_ceil_of_records_over_batch_size() {
    for batch_size in 1..=5 {
        for n in 0..=12 {
            let store = MemoryStore::new();
            let mut stream = bump(&store, batch_size, records(n));
            let out = collect(&mut stream).await;

            let expected = n.div_ceil(batch_size);
            assert_eq!(out.len(), expected, "n={n} batch_size={batch_size}");

            let mut total = 0;
            for (k, record) in out.iter().enumerate() {
                let (batch, cumulative, sequence) = summary(record);
                total += batch;
                assert!(batch > 0 && batch <= batch_size);
                assert_eq!(cumulative, total as i64);
                assert_eq!(sequence, k as u64 + 1);
            }
            assert_eq!(total, n);
            assert_eq!(store.write_calls(), expected);
        }
    }
}

#[tokio::test]
async fn test_worker_id_from_context() {
    let store = MemoryStore::new();
    let mut stream = bump(&store, 2, records(3));
    stream.set_context(&StreamContext::new().with_worker_id("worker-3"));

    let out = collect(&mut stream).await;
    assert_eq!(out.len(), 2);
    for record in &out {
        assert_eq!(record.get("worker"), Some(&json!("worker-3")));
    }
}

#[tokio::test]
async fn test_owned_connection_is_closed() {
    let store = MemoryStore::new();
    let mut stream = bump(&store, 2, records(2));
    collect(&mut stream).await;
    assert_eq!(store.shutdown_count(), 1);
}

#[tokio::test]
async fn test_borrowed_connection_stays_open() {
    let store = MemoryStore::new();
    let connector = Arc::new(MemoryConnector::new(store.clone()));
    let registry = Arc::new(WriterRegistry::new(connector.clone()));
    let context = StreamContext::new().with_registry(Arc::clone(&registry));

    for _ in 0..2 {
        let mut stream = bump(&store, 2, records(3));
        stream.set_context(&context);
        collect(&mut stream).await;
    }

    assert_eq!(connector.store().shutdown_count(), 0);
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(store.document_count("products"), 3);
    assert_eq!(
        store.counter("products", &json!("doc-0"), "bump"),
        Some(2)
    );

    registry.shutdown_all().await.unwrap();
    assert_eq!(store.shutdown_count(), 1);
}

#[tokio::test]
async fn test_connect_failure_fails_open() {
    let store = MemoryStore::new();
    let connector = MemoryConnector::new(store.clone());
    connector.fail_connect(StoreError::Transport("refused".to_string()));
    let source = MemorySource::new(records(2));
    let probe = source.probe();
    let mut stream = BumpStream::new(
        BumpConfig::new("products", "mem://local", 2).unwrap(),
        Box::new(source),
        Arc::new(connector),
    );

    let err = stream.open().await.unwrap_err();
    assert!(matches!(err, Error::Connection { .. }), "{err}");
    let message = err.to_string();
    assert!(message.contains("mem://local"), "{message}");
    assert!(message.contains("transport"), "{message}");
    assert!(message.contains("refused"), "{message}");
    assert_eq!(probe.opens(), 0);

    assert!(stream.read().await.unwrap_err().is_protocol_violation());
    assert_eq!(store.write_calls(), 0);
}

#[tokio::test]
async fn test_upstream_open_failure_releases_owned_connection() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.jsonl");

    let store = MemoryStore::new();
    let mut stream = BumpStream::new(
        BumpConfig::new("products", "mem://local", 2).unwrap(),
        Box::new(jsonl_source::JsonlSource::new(&missing)),
        Arc::new(MemoryConnector::new(store.clone())),
    );

    let err = stream.open().await.unwrap_err();
    assert!(matches!(err, Error::Source(_)), "{err}");
    assert!(err.to_string().contains("missing.jsonl"), "{err}");
    assert_eq!(store.shutdown_count(), 1);

    assert!(stream.read().await.unwrap_err().is_protocol_violation());
}

#[tokio::test]
async fn test_upstream_lifecycle_and_ordering() {
    let store = MemoryStore::new();
    let source = MemorySource::new(records(1)).with_ordering(SortOrder::ascending("id"));
    let probe = source.probe();
    let mut stream = BumpStream::new(
        BumpConfig::new("products", "mem://local", 4).unwrap(),
        Box::new(source),
        Arc::new(MemoryConnector::new(store)),
    );

    assert_eq!(stream.ordering(), Some(SortOrder::ascending("id")));
    collect(&mut stream).await;
    assert_eq!(probe.opens(), 1);
    assert_eq!(probe.closes(), 1);
}

#[test]
fn test_expression_round_trip() {
    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store)));
    let text = r#"bump(products, batchSize=3, cluster="mem://local", field=clicks, id=sku, records("{\"sku\":\"p-1\"}"))"#;

    let stream = factory.construct_str(text).unwrap();
    let expression = stream.to_expression().unwrap();
    assert_eq!(expression.value_at(0), Some("products"));
    assert_eq!(expression.named_value("batchSize"), Some("3"));
    assert_eq!(expression.named_value("cluster"), Some("mem://local"));
    assert_eq!(expression.named_value("field"), Some("clicks"));
    assert_eq!(expression.named_value("id"), Some("sku"));

    let rebuilt = factory.construct(&expression).unwrap();
    assert_eq!(rebuilt.to_expression().unwrap(), expression);
}

#[test]
fn test_expression_round_trip_keeps_strict_identifier() {
    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store)));
    let text = r#"bump(products, batchSize=2, cluster="mem://local", requireId=true, records())"#;

    let expression = factory.construct_str(text).unwrap().to_expression().unwrap();
    assert_eq!(expression.named_value("requireId"), Some("true"));
    assert!(expression.to_string().contains("requireId=true"));

    let rebuilt = factory.construct(&expression).unwrap();
    assert_eq!(rebuilt.to_expression().unwrap(), expression);

    let relaxed = factory
        .construct_str(r#"bump(products, batchSize=2, cluster="mem://local", records())"#)
        .unwrap()
        .to_expression()
        .unwrap();
    assert_eq!(relaxed.named_value("requireId"), None);
}

#[test]
fn test_cluster_resolution_order() {
    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store)))
        .with_collection_cluster("audit", "mem://audit")
        .with_default_cluster("mem://default");

    let cluster_of = |text: &str| {
        let expression = factory.construct_str(text).unwrap().to_expression().unwrap();
        expression.named_value("cluster").unwrap().to_string()
    };

    assert_eq!(
        cluster_of("bump(audit, batchSize=1, cluster=mem://explicit, records())"),
        "mem://explicit"
    );
    assert_eq!(cluster_of("bump(audit, batchSize=1, records())"), "mem://audit");
    assert_eq!(cluster_of("bump(products, batchSize=1, records())"), "mem://default");
}

#[test]
fn test_construction_errors() {
    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store.clone())));
    let cases = [
        ("bump(batchSize=3, cluster=mem://a, records())", "collectionName expected"),
        ("bump(products, batchSize=3, records())", "cluster not found for collection 'products'"),
        ("bump(products, cluster=mem://a, records())", "expecting a 'batchSize' parameter"),
        ("bump(products, batchSize=0, cluster=mem://a, records())", "batchSize '0' must be greater than 0."),
        ("bump(products, batchSize=-1, cluster=mem://a, records())", "batchSize '-1' must be greater than 0."),
        ("bump(products, batchSize=many, cluster=mem://a, records())", "batchSize 'many' is not a valid integer."),
        ("bump(products, batchSize=3, cluster=mem://a)", "expecting a single stream but found 0"),
        ("bump(products, batchSize=3, cluster=mem://a, records(), records())", "expecting a single stream but found 2"),
        ("bump(products, batchSize=3, cluster=mem://a, requireId=maybe, records())", "requireId 'maybe'"),
        ("bump(products, batchSize=3, cluster=records(), records())", "'cluster' must be a plain value"),
    ];

    for (text, expected) in cases {
        let err = factory.construct_str(text).err().unwrap();
        assert!(err.is_configuration(), "{text}: {err}");
        assert!(err.to_string().contains(expected), "{text}: {err}");
    }
    assert_eq!(store.write_calls(), 0);
}

#[test]
fn test_explain_puts_datastore_at_root() {
    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store)));
    let stream = factory
        .construct_str(r#"bump(products, batchSize=3, cluster="mongodb://db:27017/shop", records())"#)
        .unwrap();

    let root = stream.explain();
    let types: Vec<ExpressionType> = root.walk().iter().map(|n| n.expression_type).collect();
    assert_eq!(
        types,
        vec![
            ExpressionType::Datastore,
            ExpressionType::StreamDecorator,
            ExpressionType::StreamSource
        ]
    );
    assert_eq!(root.function_name, "mongodb (products)");
}

#[tokio::test]
async fn test_jsonl_pipeline() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for sku in ["p-1", "p-2", "p-1", "p-3", "p-1"] {
        writeln!(file, "{}", json!({"sku": sku, "ts": 1})).unwrap();
    }
    file.flush().unwrap();

    let store = MemoryStore::new();
    let factory = StreamFactory::new(Arc::new(MemoryConnector::new(store.clone())))
        .with_default_cluster("mem://local");
    let expression = StreamExpression::new("bump")
        .with_value("products")
        .with_named("batchSize", "2")
        .with_named("field", "clicks")
        .with_named("id", "sku")
        .with_expression(
            StreamExpression::new("jsonl")
                .with_named("file", file.path().to_str().unwrap()),
        );

    let mut stream = factory.construct(&expression).unwrap();
    let out = collect(stream.as_mut()).await;

    assert_eq!(out.len(), 3);
    assert_eq!(summary(out.last().unwrap()), (1, 5, 3));
    assert_eq!(store.counter("products", &json!("p-1"), "clicks"), Some(3));
    assert_eq!(store.counter("products", &json!("p-2"), "clicks"), Some(1));
    assert_eq!(store.counter("products", &json!("p-3"), "clicks"), Some(1));
}
