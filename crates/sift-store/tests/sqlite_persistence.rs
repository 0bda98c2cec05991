use sift_embed::mock::MockEmbedder;
use sift_store::{EmbeddingStore, Entry, Mode, SearchFilter, SqliteTable, VectorStore};

fn entry(id: &str, text: &str, source: &str, tags: &[&str]) -> Entry {
    Entry {
        id: id.into(),
        text: text.into(),
        mode: Mode::Public,
        tags: tags.iter().map(|t| (*t).to_owned()).collect(),
        session_id: Some("session-1".into()),
        source: source.into(),
        date: "2026-10-18T12:00:00Z".into(),
        metadata: serde_json::Map::from_iter([
            ("kind".to_owned(), serde_json::json!("function_declaration")),
            ("startLine".to_owned(), serde_json::json!(1)),
        ]),
    }
}

async fn open_store(path: &str) -> EmbeddingStore {
    let table = SqliteTable::open(path).await.unwrap();
    let store = EmbeddingStore::new(
        "local",
        MockEmbedder::new(64).into(),
        Box::new(table),
        "sift_local",
    );
    store.init().await.unwrap();
    store
}

#[tokio::test]
async fn entries_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let path = path.to_str().unwrap();

    {
        let store = open_store(path).await;
        assert!(store.is_empty().await.unwrap());
        store
            .add(&[
                entry("1", "function foo", "src/a.ts", &["typescript"]),
                entry("2", "class Bar", "src/b.ts", &["typescript", "model"]),
            ])
            .await
            .unwrap();
    }

    let store = open_store(path).await;
    assert!(!store.is_empty().await.unwrap());

    let hits = store.search("function foo", 5, None).await.unwrap();
    assert_eq!(hits[0].source, "src/a.ts");
    assert_eq!(hits[0].mode, Mode::Public);
    assert_eq!(hits[0].session_id.as_deref(), Some("session-1"));
    assert_eq!(hits[0].metadata["kind"], "function_declaration");

    let filter = SearchFilter {
        tag: Some("model".into()),
        session: None,
    };
    let tagged = store.search("function foo", 5, Some(&filter)).await.unwrap();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].source, "src/b.ts");
}

#[tokio::test]
async fn delete_by_source_persists() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.db");
    let path = path.to_str().unwrap();

    {
        let store = open_store(path).await;
        store
            .add(&[
                entry("1", "one", "a.md", &[]),
                entry("2", "two", "a.md", &[]),
            ])
            .await
            .unwrap();
        assert_eq!(store.delete_by_source("a.md").await.unwrap(), 2);
    }

    let store = open_store(path).await;
    assert!(store.is_empty().await.unwrap());
}
