use api_types::{Business, Conversation, Message, TeamMemberWithUser, User};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use backend::{
    AppState,
    auth::JwtService,
    build_router,
    config::{AuthConfig, BackendConfig, StorageBackend},
    gateway::Gateway,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "an-integration-test-secret-of-48-bytes-length!!!";

struct TestApp {
    state: AppState,
    router: Router,
}

struct Session {
    user_id: Uuid,
    token: String,
}

impl TestApp {
    fn new() -> Self {
        let auth = AuthConfig::new(SecretString::new(SECRET.into())).unwrap();
        let jwt = Arc::new(JwtService::new(auth.jwt_secret()));
        let config = BackendConfig {
            database_url: None,
            listen_addr: "127.0.0.1:0".to_string(),
            storage: StorageBackend::Memory,
            max_connections: 1,
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            auth,
        };
        let state = AppState::new(Gateway::memory(), config, jwt);
        let router = build_router(state.clone());
        Self { state, router }
    }

    fn login(&self, email: &str) -> Session {
        let user_id = Uuid::new_v4();
        let token = self
            .state
            .jwt()
            .issue(user_id, email, chrono::Duration::minutes(5))
            .unwrap();
        Session { user_id, token }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn ok<T: DeserializeOwned>(
        &self,
        method: Method,
        uri: &str,
        session: &Session,
        body: Option<Value>,
    ) -> T {
        let (status, value) = self.send(method, uri, Some(&session.token), body).await;
        assert_eq!(status, StatusCode::OK, "{uri} returned {value}");
        serde_json::from_value(value).unwrap()
    }

    async fn business(&self, owner: &Session) -> Business {
        self.ok(
            Method::POST,
            "/businesses",
            owner,
            Some(json!({ "name": "Acme Outfitters" })),
        )
        .await
    }

    async fn conversation(&self, owner: &Session, business_id: Uuid) -> Conversation {
        let customer: Value = self
            .ok(
                Method::POST,
                &format!("/customers?businessId={business_id}"),
                owner,
                Some(json!({ "name": "Grace", "phone": "+15550001" })),
            )
            .await;
        self.ok(
            Method::POST,
            &format!("/conversations?businessId={business_id}"),
            owner,
            Some(json!({ "customer_id": customer["id"], "platform": "whatsapp" })),
        )
        .await
    }
}

#[tokio::test]
async fn health_is_public_and_versioned() {
    let app = TestApp::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-server-version"));
}

#[tokio::test]
async fn protected_routes_reject_missing_and_forged_tokens() {
    let app = TestApp::new();

    let (status, body) = app.send(Method::GET, "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let forged = JwtService::new(&SecretString::new(
        "a-completely-different-secret-of-enough-length".into(),
    ))
    .issue(Uuid::new_v4(), "mallory@x.com", chrono::Duration::minutes(5))
    .unwrap();
    let (status, _) = app
        .send(Method::GET, "/users/me", Some(&forged), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn first_request_provisions_the_user() {
    let app = TestApp::new();
    let session = app.login("Owner@Example.com");

    let me: User = app.ok(Method::GET, "/users/me", &session, None).await;
    assert_eq!(me.id, session.user_id);
    assert_eq!(me.email, "owner@example.com");
}

#[tokio::test]
async fn owner_runs_a_conversation_end_to_end() {
    let app = TestApp::new();
    let owner = app.login("owner@acme.test");
    let business = app.business(&owner).await;
    assert_eq!(business.slug, "acme-outfitters");

    let team: Value = app
        .ok(
            Method::GET,
            &format!("/team?businessId={}", business.id),
            &owner,
            None,
        )
        .await;
    assert_eq!(team["members"][0]["role"], "owner");

    let conversation = app.conversation(&owner, business.id).await;
    let message: Message = app
        .ok(
            Method::POST,
            "/messages",
            &owner,
            Some(json!({
                "conversation_id": conversation.id,
                "sender_type": "agent",
                "content": "Your order has shipped",
                "platform": "whatsapp",
            })),
        )
        .await;
    assert_eq!(message.sender_id, Some(owner.user_id));

    let listed: Value = app
        .ok(
            Method::GET,
            &format!("/messages?conversationId={}", conversation.id),
            &owner,
            None,
        )
        .await;
    assert_eq!(listed["messages"].as_array().map(Vec::len), Some(1));

    let resolved: Conversation = app
        .ok(
            Method::PATCH,
            &format!("/conversations/{}/status", conversation.id),
            &owner,
            Some(json!({ "status": "resolved" })),
        )
        .await;
    assert!(resolved.resolved_at.is_some());

    let (status, _) = app
        .send(
            Method::DELETE,
            &format!("/conversations/{}", conversation.id),
            Some(&owner.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(
            Method::GET,
            &format!("/conversations/{}", conversation.id),
            Some(&owner.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outsiders_cannot_read_a_business() {
    let app = TestApp::new();
    let owner = app.login("owner@acme.test");
    let business = app.business(&owner).await;
    let outsider = app.login("outsider@else.test");

    let (status, body) = app
        .send(
            Method::GET,
            &format!("/conversations?businessId={}", business.id),
            Some(&outsider.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "not a member of this business");
}

#[tokio::test]
async fn limited_agent_only_sees_assigned_conversations() {
    let app = TestApp::new();
    let owner = app.login("owner@acme.test");
    let business = app.business(&owner).await;

    let invited: TeamMemberWithUser = app
        .ok(
            Method::POST,
            &format!("/team/invite?businessId={}", business.id),
            &owner,
            Some(json!({ "email": "Agent@Acme.test", "role": "limited_agent" })),
        )
        .await;
    let member_id = invited.member.id;

    let mine = app.conversation(&owner, business.id).await;
    let other = app.conversation(&owner, business.id).await;
    let _: Conversation = app
        .ok(
            Method::POST,
            &format!("/conversations/{}/assign", mine.id),
            &owner,
            Some(json!({ "assignmentType": "team_member", "teamMemberId": member_id })),
        )
        .await;

    // The agent signs in under a fresh id and claims the invited placeholder.
    let agent = app.login("agent@acme.test");
    let listed: Value = app
        .ok(
            Method::GET,
            &format!("/conversations?businessId={}", business.id),
            &agent,
            None,
        )
        .await;
    let ids: Vec<&str> = listed["conversations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|row| row["id"].as_str())
        .collect();
    assert_eq!(ids, vec![mine.id.to_string().as_str()]);

    let (status, _) = app
        .send(
            Method::GET,
            &format!("/conversations/{}", other.id),
            Some(&agent.token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            Method::POST,
            &format!("/conversations/{}/assign", mine.id),
            Some(&agent.token),
            Some(json!({ "assignmentType": "unassigned" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    app.state.notifier().wait_idle().await;
    let notifications: Value = app
        .ok(
            Method::GET,
            &format!("/notifications?businessId={}", business.id),
            &agent,
            None,
        )
        .await;
    assert_eq!(
        notifications["notifications"][0]["notification_type"],
        "conversation_assigned"
    );
}
