use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use title_api::seed::{load_seed_data, SEED_TITLE_NUMBER};
use title_api::{serve_store, MemoryStore, RequestValidator};
use tokio::net::TcpListener;

// Test client wrapper for making API calls
struct TestClient {
    client: Client,
    base_url: String,
}

impl TestClient {
    /// Start a server on an ephemeral port over a freshly seeded store.
    async fn start() -> Self {
        let store = Arc::new(MemoryStore::new());
        load_seed_data(store.as_ref()).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let validator = RequestValidator::bundled().unwrap();
        tokio::spawn(async move {
            serve_store(listener, store, validator).await.unwrap();
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", address),
        }
    }

    async fn get(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn put(&self, path: &str, json: Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(&format!("{}{}", self.base_url, path))
            .json(&json)
            .send()
            .await
    }

    async fn put_empty(&self, path: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .put(&format!("{}{}", self.base_url, path))
            .send()
            .await
    }

    async fn seeded_title(&self) -> Value {
        let response = self
            .get(&format!("/v1/titles/{}", SEED_TITLE_NUMBER))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        response.json().await.unwrap()
    }
}

/// Update body equivalent to the title as it currently stands.
fn unchanged_payload(title: &Value) -> Value {
    json!({
        "owner": title["owner"],
        "restrictions": title["restrictions"],
        "charges": title["charges"],
    })
}

async fn error_body(response: reqwest::Response) -> (StatusCode, Value) {
    let status = response.status();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn test_health() {
    let client = TestClient::start().await;
    let response = client.get("/health").await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_get_unknown_title() {
    let client = TestClient::start().await;
    let (status, body) = error_body(client.get("/v1/titles/ABC123456").await.unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        body["error_message"],
        "A title with the specified title number was not found."
    );
    assert_eq!(body["error_code"], "E002");
}

#[tokio::test]
async fn test_get_title_view_shape() {
    let client = TestClient::start().await;
    let title = client.seeded_title().await;

    assert_eq!(title["title_number"], SEED_TITLE_NUMBER);
    assert_eq!(title["owner"]["type"], "individual");
    assert_eq!(title["owner"]["address"]["postcode"], "BS2 8EN");
    assert_eq!(title["address"]["street"], "Digital Street");
    assert_eq!(title["restrictions"][0]["restriction_id"], "RX001");
    assert_eq!(
        title["restrictions"][0]["consenting_party_string"],
        "O=Generic Bank,L=London,C=GB,OU=Mortgages"
    );
    assert_eq!(title["restrictions"][0]["consenting_party"]["state"], Value::Null);
    assert_eq!(title["restriction_consenting_parties"][0]["organisation"], "Generic Bank");
    assert_eq!(title["charges"].as_array().unwrap().len(), 1);
    assert_eq!(title["charges"][0]["lender_string"], "O=Second Lending Company,L=Leeds,C=GB");
    assert_eq!(title["price_history"][0]["date"], 1241136000);
    assert_eq!(title["price_history"][0]["date_iso"], "2009-05-01T00:00:00");
    assert_eq!(title["updated_at"], Value::Null);
    assert_eq!(title["locked_at"], Value::Null);
}

#[tokio::test]
async fn test_search_titles() {
    let client = TestClient::start().await;

    let (status, body) = error_body(client.get("/v1/titles").await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error_message"],
        "'owner_identity' or 'owner_email_address' is required."
    );

    let response = client
        .get("/v1/titles?owner_email_address=Lisa.Seller@example.com")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let titles: Vec<Value> = response.json().await.unwrap();
    assert_eq!(titles.len(), 1);
    assert_eq!(titles[0]["title_number"], SEED_TITLE_NUMBER);

    let titles: Vec<Value> = client
        .get("/v1/titles?owner_identity=1&address_house_name_number=1&address_postcode=BS2%208EN")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(titles.len(), 1);

    let titles: Vec<Value> = client
        .get("/v1/titles?owner_identity=1&address_house_name_number=2&address_postcode=BS2%208EN")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(titles.is_empty());

    let response = client
        .get("/v1/titles?owner_identity=1&address_postcode=BS2%208EN")
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_owners() {
    let client = TestClient::start().await;

    let (status, body) = error_body(client.get("/v1/owners").await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_message"], "'email_address' is required.");

    let owners: Vec<Value> = client
        .get("/v1/owners?email_address=LISA.SELLER@example.com")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0]["first_name"], "Lisa");

    let owners: Vec<Value> = client
        .get("/v1/owners?email_address=nobody@example.com")
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(owners.is_empty());
}

#[tokio::test]
async fn test_conveyancers() {
    let client = TestClient::start().await;

    let conveyancers: Vec<Value> = client.get("/v1/conveyancers").await.unwrap().json().await.unwrap();
    assert_eq!(conveyancers.len(), 1);
    assert_eq!(conveyancers[0]["x500"]["locality"], "Plymouth");
    assert_eq!(conveyancers[0]["company_name"], "Generic Conveyancing Company");

    let id = conveyancers[0]["conveyancer_id"].as_i64().unwrap();
    let conveyancer: Value = client
        .get(&format!("/v1/conveyancers/{}", id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(conveyancer["x500_string"], conveyancers[0]["x500_string"]);

    let (status, body) = error_body(client.get("/v1/conveyancers/9999").await.unwrap()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "E002");
}

#[tokio::test]
async fn test_lock_flow() {
    let client = TestClient::start().await;
    let path = format!("/v1/titles/{}", SEED_TITLE_NUMBER);

    let response = client.put_empty(&format!("{}/lock", path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let title: Value = response.json().await.unwrap();
    assert!(title["locked_at"].is_string());

    let (status, body) = error_body(client.put_empty(&format!("{}/lock", path)).await.unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_message"], "The title is already locked.");

    let payload = unchanged_payload(&title);
    let (status, body) = error_body(client.put(&path, payload.clone()).await.unwrap()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error_message"]
        .as_str()
        .unwrap()
        .starts_with("Title is locked until "));

    let response = client.put_empty(&format!("{}/unlock", path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let title: Value = response.json().await.unwrap();
    assert_eq!(title["locked_at"], Value::Null);

    let (status, body) = error_body(client.put_empty(&format!("{}/unlock", path)).await.unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_message"], "The title is already unlocked.");

    let response = client.put(&path, payload).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = client.put_empty("/v1/titles/ABC123456/lock").await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_unchanged_title() {
    let client = TestClient::start().await;
    let before = client.seeded_title().await;

    let response = client
        .put(&format!("/v1/titles/{}", SEED_TITLE_NUMBER), unchanged_payload(&before))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let after: Value = response.json().await.unwrap();

    assert_eq!(after["restrictions"], before["restrictions"]);
    assert_eq!(after["charges"], before["charges"]);
    assert_eq!(after["owner"], before["owner"]);
    assert!(after["updated_at"].is_string());
}

#[tokio::test]
async fn test_update_replaces_restrictions() {
    let client = TestClient::start().await;
    let title = client.seeded_title().await;
    let mut payload = unchanged_payload(&title);
    payload["restrictions"] = json!([{
        "restriction_id": "rx002",
        "restriction_type": "ORES",
        "restriction_text": "No disposition without consent.",
        "date": "2019-01-05",
        "consenting_party": {
            "organisation": "Generic Conveyancing Company",
            "locality": "Plymouth",
            "country": "GB"
        }
    }]);

    let response = client
        .put(&format!("/v1/titles/{}", SEED_TITLE_NUMBER), payload)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.unwrap();

    let restrictions = updated["restrictions"].as_array().unwrap();
    assert_eq!(restrictions.len(), 1);
    assert_eq!(restrictions[0]["restriction_id"], "RX002");
    assert_eq!(restrictions[0]["charge"], Value::Null);
    assert_eq!(
        restrictions[0]["consenting_party_string"],
        "O=Generic Conveyancing Company,L=Plymouth,C=GB"
    );
    assert_eq!(updated["charges"], title["charges"]);
}

#[tokio::test]
async fn test_update_rejects_invalid_payloads() {
    let client = TestClient::start().await;
    let title = client.seeded_title().await;
    let path = format!("/v1/titles/{}", SEED_TITLE_NUMBER);

    let (status, body) = error_body(client.put(&path, json!({ "charges": [] })).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "E001");

    let mut payload = unchanged_payload(&title);
    payload["charges"] = json!([{
        "date": "2019-01-05",
        "lender_string": "O=Generic Bank,L=london,C=GB",
        "amount": 100,
        "amount_currency_code": "GBP"
    }]);
    let (status, body) = error_body(client.put(&path, payload).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_message"], "First character is not uppercase: locality");

    let response = client
        .put("/v1/titles/ABC123456", unchanged_payload(&title))
        .await
        .unwrap();
    let (status, body) = error_body(response).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error_code"], "E404");
}

#[tokio::test]
async fn test_update_owner_email_conflict() {
    let client = TestClient::start().await;
    let title = client.seeded_title().await;
    let path = format!("/v1/titles/{}", SEED_TITLE_NUMBER);

    // new owner reusing the seeded owner's email address
    let mut payload = unchanged_payload(&title);
    payload["owner"]["identity"] = json!("2");
    let (status, body) = error_body(client.put(&path, payload).await.unwrap()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_message"], "Owner's email address is already in use.");
    assert_eq!(body["error_code"], "E003");

    let unchanged = client.seeded_title().await;
    assert_eq!(unchanged["owner"]["identity"], "1");
    assert_eq!(unchanged["updated_at"], Value::Null);
}
