use super::*;
use crate::config::{LiveKitConfig, OpenAiConfig, PineconeConfig, RetrievalConfig, ServerConfig};
use crate::net::HttpClient;
use lopdf::content::{Content, Operation};
use lopdf::{Object, Stream, dictionary};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn chunking(size: usize, overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size: size,
        chunk_overlap: overlap,
    }
}

#[test]
fn empty_text_yields_no_chunks() {
    assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
}

#[test]
fn short_text_yields_single_chunk() {
    let text = "a".repeat(200);
    let chunks = chunk_text(&text, &ChunkingConfig::default());
    assert_eq!(chunks, vec![text]);
}

#[test]
fn window_formula_holds() {
    // ceil((L - O) / (C - O)) with C=200, O=50.
    for (len, expected) in [(1, 1), (200, 1), (201, 2), (250, 2), (350, 2), (351, 3)] {
        let text = "x".repeat(len);
        let chunks = chunk_text(&text, &ChunkingConfig::default());
        assert_eq!(chunks.len(), expected, "length {len}");
    }
}

#[test]
fn consecutive_chunks_overlap() {
    let text: String = ('a'..='z').cycle().take(350).collect();
    let chunks = chunk_text(&text, &ChunkingConfig::default());
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].len(), 200);
    // Second window starts at character 150, repeating the last 50 chars.
    assert_eq!(&chunks[0][150..], &chunks[1][..50]);
}

#[test]
fn chunking_respects_utf8_boundaries() {
    let text = "é".repeat(75);
    let chunks = chunk_text(&text, &chunking(50, 10));
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].chars().count(), 50);
    assert_eq!(chunks[1].chars().count(), 35);
    assert!(chunks.iter().all(|c| c.chars().all(|ch| ch == 'é')));
}

#[test]
fn chunk_page_tags_source_and_index() {
    let page = DocumentPage {
        source: "manual.pdf".to_string(),
        page: 3,
        text: "y".repeat(250),
    };
    let chunks = chunk_page(&page, &ChunkingConfig::default());
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].source, "manual.pdf");
    assert_eq!(chunks[0].page, 3);
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[1].chunk_index, 1);
}

#[test]
fn collect_pdfs_requires_existing_directory() {
    let err = collect_pdfs(Path::new("/nonexistent/docs")).expect_err("should fail");
    assert!(matches!(err, RagError::Ingest(_)), "{err}");
    assert!(err.to_string().contains("not found"), "{err}");
}

#[test]
fn collect_pdfs_requires_at_least_one_pdf() {
    let dir = TempDir::new().expect("tempdir");
    std::fs::write(dir.path().join("notes.txt"), "not a pdf").expect("write");

    let err = collect_pdfs(dir.path()).expect_err("should fail");
    assert!(err.to_string().contains("No PDF files"), "{err}");
}

#[test]
fn collect_pdfs_sorts_and_filters() {
    let dir = TempDir::new().expect("tempdir");
    for name in ["b.pdf", "a.PDF", "c.txt"] {
        std::fs::write(dir.path().join(name), "stub").expect("write");
    }

    let files = collect_pdfs(dir.path()).expect("should find pdfs");
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().expect("name").to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.PDF", "b.pdf"]);
}

fn write_test_pdf(path: &Path, page_texts: &[&str]) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for text in page_texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = i64::try_from(page_texts.len()).expect("page count");
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).expect("save pdf");
}

#[test]
fn load_pdf_extracts_page_text() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("sample.pdf");
    write_test_pdf(&path, &["Hello first page", "Second page here"]);

    let pages = load_pdf(&path).expect("load should succeed");
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].source, "sample.pdf");
    assert_eq!(pages[0].page, 1);
    assert!(pages[0].text.contains("Hello first page"), "{}", pages[0].text);
    assert_eq!(pages[1].page, 2);
    assert!(pages[1].text.contains("Second page here"), "{}", pages[1].text);
}

#[test]
fn load_pdf_fails_on_garbage() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, "this is not a pdf").expect("write");

    let err = load_pdf(&path).expect_err("garbage should fail to load");
    assert!(matches!(err, RagError::Ingest(_)), "{err}");
}

fn test_config(base: &str) -> Config {
    Config {
        openai: OpenAiConfig {
            api_key: "sk-test".to_string(),
            api_base: Url::parse(&format!("{base}/v1/")).expect("valid url"),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o".to_string(),
            embedding_dimension: 3,
        },
        pinecone: PineconeConfig {
            api_key: "pc-test".to_string(),
            control_plane_url: Url::parse(&format!("{base}/")).expect("valid url"),
            index_name: "test-index".to_string(),
            namespace: "test-ns".to_string(),
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
        },
        livekit: None::<LiveKitConfig>,
        chunking: ChunkingConfig::default(),
        retrieval: RetrievalConfig::default(),
        server: ServerConfig::default(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_fails_before_any_network_call_when_directory_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    let config = test_config(&server.uri());
    let pipeline = IngestPipeline::new(&config);
    let dir_path = dir.path().to_path_buf();
    let err = tokio::task::spawn_blocking(move || pipeline.run(&dir_path))
        .await
        .expect("task should not panic")
        .expect_err("empty directory should fail");

    assert!(matches!(err, RagError::Ingest(_)), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipeline_embeds_and_upserts_all_chunks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/indexes"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"indexes": [{"name": "test-index"}]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/indexes/test-index"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "test-index",
            "dimension": 3,
            "metric": "cosine",
            "host": server.uri(),
            "status": {"ready": true, "state": "Ready"},
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(|req: &Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&req.body).expect("request is json");
            let inputs = body["input"].as_array().expect("input array");
            let data: Vec<serde_json::Value> = inputs
                .iter()
                .enumerate()
                .map(|(i, _)| json!({"embedding": [0.1, 0.2, 0.3], "index": i}))
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"data": data}))
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(|req: &Request| {
            let body: serde_json::Value =
                serde_json::from_slice(&req.body).expect("request is json");
            let count = body["vectors"].as_array().expect("vectors array").len();
            ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": count}))
        })
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/describe_index_stats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "dimension": 3,
            "totalVectorCount": 0,
            "namespaces": {},
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("tempdir");
    write_test_pdf(&dir.path().join("doc.pdf"), &["Short page of text"]);

    let config = test_config(&server.uri());
    let pipeline = IngestPipeline::from_parts(
        crate::openai::OpenAiClient::new(&config.openai)
            .with_http_client(HttpClient::new().with_retry_attempts(1)),
        PineconeClient::new(&config.pinecone)
            .with_http_client(HttpClient::new().with_retry_attempts(1))
            .with_ready_poll(Duration::from_millis(1), Duration::from_millis(100)),
        config,
    );

    let dir_path = dir.path().to_path_buf();
    let stats = tokio::task::spawn_blocking(move || pipeline.run(&dir_path))
        .await
        .expect("task should not panic")
        .expect("ingestion should succeed");

    assert_eq!(stats.documents, 1);
    assert_eq!(stats.pages, 1);
    assert_eq!(stats.chunks, 1);
    assert_eq!(stats.upserted, 1);
}
