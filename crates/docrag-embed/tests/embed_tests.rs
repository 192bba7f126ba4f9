use docrag_core::config::{EmbeddingProvider, EmbeddingSettings};
use docrag_core::error::Error;
use docrag_embed::{embedder_from_settings, Embedder, FakeEmbedder, OpenAiEmbedder};

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[tokio::test]
async fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(64);
    let texts = vec!["hello world".to_string(), "hello world".to_string(), "other text".to_string()];
    let embs = embedder.embed_batch(&texts).await.expect("embed_batch");

    assert_eq!(embs.len(), 3, "one vector per input");
    for v in &embs {
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    }
    for (a, b) in embs[0].iter().zip(embs[1].iter()) {
        assert!((a - b).abs() <= 1e-6);
    }
}

#[tokio::test]
async fn fake_embedder_ranks_shared_words_closer() {
    let embedder = FakeEmbedder::new(256);
    let q = embedder.embed_query("vacation policy").await.unwrap();
    let close = embedder.embed_text("Our vacation policy grants twenty days.");
    let far = embedder.embed_text("Servers are patched every Tuesday night.");
    assert!(cosine(&q, &close) > cosine(&q, &far));
}

#[tokio::test]
async fn fake_embedder_handles_empty_text() {
    let embedder = FakeEmbedder::new(8);
    let v = embedder.embed_query("   ").await.unwrap();
    assert_eq!(v.len(), 8);
    assert!(v.iter().all(|x| x.is_finite()));
}

#[test]
fn embedder_ids_distinguish_models() {
    let a = FakeEmbedder::new(32);
    let b = FakeEmbedder::new(64);
    assert_ne!(a.embedder_id(), b.embedder_id());
}

#[test]
fn openai_embedder_requires_api_key() {
    let settings = EmbeddingSettings { api_key: None, ..EmbeddingSettings::default() };
    let err = OpenAiEmbedder::new(&settings).err().expect("missing key must fail");
    assert!(matches!(err, Error::InvalidConfig(_)));
}

#[test]
fn openai_embedder_builds_with_key() {
    let settings = EmbeddingSettings {
        api_key: Some("sk-test".to_string()),
        dimension: 1536,
        ..EmbeddingSettings::default()
    };
    let embedder = OpenAiEmbedder::new(&settings).expect("embedder");
    assert_eq!(embedder.dim(), 1536);
    assert_eq!(embedder.embedder_id(), "openai:text-embedding-3-small:1536");
}

#[test]
fn factory_honours_fake_provider() {
    let settings = EmbeddingSettings {
        provider: EmbeddingProvider::Fake,
        dimension: 16,
        ..EmbeddingSettings::default()
    };
    let embedder = embedder_from_settings(&settings).expect("fake embedder");
    assert_eq!(embedder.dim(), 16);
    assert!(embedder.embedder_id().starts_with("fake:"));
}

#[tokio::test]
async fn openai_embedder_with_empty_batch_makes_no_request() {
    let settings = EmbeddingSettings {
        api_key: Some("sk-test".to_string()),
        endpoint: "http://127.0.0.1:9".to_string(),
        ..EmbeddingSettings::default()
    };
    let embedder = OpenAiEmbedder::new(&settings).expect("embedder");
    assert!(embedder.embed_batch(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_provider_is_a_provider_error() {
    let settings = EmbeddingSettings {
        api_key: Some("sk-test".to_string()),
        endpoint: "http://127.0.0.1:9".to_string(),
        timeout_secs: 2,
        ..EmbeddingSettings::default()
    };
    let embedder = OpenAiEmbedder::new(&settings).expect("embedder");
    let err = embedder.embed_query("hello").await.unwrap_err();
    assert!(err.is_provider(), "got {err:?}");
}
