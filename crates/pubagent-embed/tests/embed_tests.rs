use candle_core::{DType, Device, Tensor};
use pubagent_core::config::EmbeddingSettings;
use pubagent_core::traits::Embedder;
use pubagent_embed::{cosine_similarity, get_default_embedder, l2_normalize, masked_mean_l2, FakeEmbedder};

#[test]
fn fake_embedder_shapes_and_determinism() {
    let embedder = FakeEmbedder::new(384);
    let texts = vec!["hello world".to_string(), "hello world".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let v1 = &embs[0];
    let v2 = &embs[1];

    assert_eq!(v1.len(), 384, "embedding dim is 384");

    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");

    assert_eq!(v1, v2, "deterministic for same input");
    let again = embedder.embed("hello world").expect("embed");
    assert_eq!(&again, v1, "single and batch paths agree");
}

#[test]
fn self_similarity_is_maximal() {
    let embedder = FakeEmbedder::new(64);
    let sky = embedder.embed("The sky is blue.").unwrap();
    let self_score = cosine_similarity(&sky, &sky);
    assert!((self_score - 1.0).abs() < 1e-5);
    for other in ["What color is the sky?", "Grass is green.", ""] {
        let v = embedder.embed(other).unwrap();
        assert!(cosine_similarity(&sky, &v) <= self_score + 1e-6, "{other:?} beats self match");
    }
}

#[test]
fn shared_words_score_higher() {
    let embedder = FakeEmbedder::new(256);
    let doc = embedder.embed("The sky is blue.").unwrap();
    let related = embedder.embed("What color is the sky?").unwrap();
    let unrelated = embedder.embed("Photosynthesis converts light into chemical energy").unwrap();
    assert!(cosine_similarity(&doc, &related) > cosine_similarity(&doc, &unrelated));
}

#[test]
fn empty_text_still_yields_unit_vector() {
    let v = FakeEmbedder::new(16).embed("").unwrap();
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-6);
}

#[test]
fn default_embedder_honours_use_fake() {
    let settings = EmbeddingSettings { use_fake: true, fake_dim: 32, ..EmbeddingSettings::default() };
    let embedder = get_default_embedder(&settings).expect("fake embedder");
    assert_eq!(embedder.dim(), 32);
    assert!(embedder.id().starts_with("fake:"));
}

#[test]
fn missing_model_is_embedding_unavailable() {
    let settings = EmbeddingSettings {
        model: "nobody/does-not-exist".to_string(),
        model_dir: Some(std::path::PathBuf::from("/nonexistent/model/dir")),
        ..EmbeddingSettings::default()
    };
    match pubagent_embed::BertEmbedder::load(&settings) {
        Err(pubagent_core::Error::EmbeddingUnavailable(_)) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("model should not load"),
    }
}

#[test]
fn l2_normalize_scales_to_unit() {
    let mut v = vec![3.0f32, 4.0];
    l2_normalize(&mut v);
    assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    let mut zero = vec![0.0f32; 3];
    l2_normalize(&mut zero);
    assert_eq!(zero, vec![0.0; 3]);
}

#[test]
fn masked_mean_l2_basic() {
    let dev = Device::Cpu;
    // Two tokens with hidden dim 4; second token is masked out.
    let h = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0,  // token 0
                                 5.0, 6.0, 7.0, 8.0],    // token 1
                               (1, 2, 4), &dev).unwrap();
    let mask = Tensor::from_slice(&[1u32, 0u32], (1, 2), &dev).unwrap()
        .to_dtype(DType::F32).unwrap();
    let out = masked_mean_l2(&h, &mask).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let v = &v[0];
    // Mean over unmasked tokens = first token [1,2,3,4], then L2 normalize
    let norm: f32 = (1.0f32*1.0 + 2.0*2.0 + 3.0*3.0 + 4.0*4.0).sqrt();
    let expected = [1.0/norm, 2.0/norm, 3.0/norm, 4.0/norm];
    for (a,b) in v.iter().cloned().zip(expected) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}
