use super::*;
use crate::config::BedrockConfig;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn titan_embedding_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/model/amazon.titan-embed-text-v2:0/invoke"))
        .and(body_partial_json(json!({ "inputText": "K5 가격", "dimensions": 256 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embedding": [0.5, -0.5],
            "inputTextTokenCount": 4
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = BedrockConfig {
        endpoint: Some(server.uri()),
        ..BedrockConfig::default()
    };
    let client = BedrockClient::new(&config)
        .expect("should create client")
        .with_api_key("k");
    let embedder = TitanEmbedder::new(client, "amazon.titan-embed-text-v2:0".to_string(), 256);

    let vector = embedder.embed("K5 가격").await.expect("should embed");
    assert_eq!(vector, vec![0.5, -0.5]);
}

#[tokio::test]
async fn titan_malformed_response_is_an_embedding_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let config = BedrockConfig {
        endpoint: Some(server.uri()),
        ..BedrockConfig::default()
    };
    let client = BedrockClient::new(&config)
        .expect("should create client")
        .with_api_key("k");
    let embedder = TitanEmbedder::new(client, "titan".to_string(), 256);

    assert!(matches!(
        embedder.embed("x").await,
        Err(RagError::Embedding(_))
    ));
}
