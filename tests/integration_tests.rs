use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, DurationRound, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use bookingdesk::config::AppConfig;
use bookingdesk::db::{self, SqliteBookingStore};
use bookingdesk::handlers;
use bookingdesk::models::{BookingFields, BookingKey, Reminder, ReminderStatus};
use bookingdesk::services::ai::{LlmProvider, Message};
use bookingdesk::services::messaging::{MessagingProvider, TemplateMessage};
use bookingdesk::services::reminders::{ReminderTemplates, TemplateReminderSender};
use bookingdesk::services::scheduler::ReminderScheduler;
use bookingdesk::services::store::BookingStore;
use bookingdesk::services::time::parse_utc_offset;
use bookingdesk::state::AppState;

// ── Mock Providers ──

struct MockLlm {
    calls: Arc<Mutex<usize>>,
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, _system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        *self.calls.lock().unwrap() += 1;
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");

        // Simple deterministic responses based on user message content
        if last.contains("human") {
            Ok(r#"{"intent":"handoff","name":"Ana","service":"","category":"","date":"","time":"","contact":"","notes":""}"#.to_string())
        } else if last.contains("book everything") {
            Ok(r#"{"intent":"schedule","name":"Ana Souza","service":"Company website","category":"Web & Apps","date":"20/08/2099","time":"14h","contact":"ana@example.com","notes":"bring mockups"}"#.to_string())
        } else if last.contains("book vaguely") {
            Ok(r#"```json
{"intent":"schedule","name":"Ana Souza","service":"Company website","category":"Web & Apps","date":"next week","time":"afternoon","contact":"ana@example.com","notes":""}
```"#.to_string())
        } else if last.contains("pricing") {
            Ok(r#"{"intent":"info","name":"Ana Souza","service":"Company website","category":"Web & Apps","date":"20/08/2099","time":"14h","contact":"ana@example.com","notes":""}"#.to_string())
        } else if last.contains("gibberish") {
            Ok("Sorry, I could not read that.".to_string())
        } else if last.contains("book") {
            Ok(r#"{"intent":"schedule","name":"Ana Souza","service":"","category":"","date":"20/08","time":"","contact":"","notes":""}"#.to_string())
        } else {
            Ok(r#"{"intent":"info","name":"","service":"","category":"","date":"","time":"","contact":"","notes":""}"#.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Sent {
    Text { route: String, to: String, body: String },
    Template { route: String, to: String, template: TemplateMessage },
}

#[derive(Default)]
struct MockMessaging {
    sent: Mutex<Vec<Sent>>,
}

impl MockMessaging {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn texts_to(&self, to: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { to: t, body, .. } if t == to => Some(body),
                _ => None,
            })
            .collect()
    }

    fn templates_to(&self, to: &str) -> Vec<TemplateMessage> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Template { to: t, template, .. } if t == to => Some(template),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_text(&self, route: &str, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            route: route.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn send_template(
        &self,
        route: &str,
        to: &str,
        template: &TemplateMessage,
    ) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(Sent::Template {
            route: route.to_string(),
            to: to.to_string(),
            template: template.clone(),
        });
        Ok(())
    }
}

// ── Helpers ──

const CUSTOMER: &str = "5511988887777";
const OWNER: &str = "5511900000000";

fn test_config() -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        verify_token: "verify-me".to_string(),
        whatsapp_token: "".to_string(),
        whatsapp_app_secret: "".to_string(), // empty = skip signature validation
        graph_api_version: "v20.0".to_string(),
        owner_whatsapp: OWNER.to_string(),
        owner_name: "Eng. Carvalho".to_string(),
        llm_provider: "ollama".to_string(),
        azure_openai_endpoint: "".to_string(),
        azure_openai_api_key: "".to_string(),
        azure_openai_deployment: "gpt-4o-mini".to_string(),
        azure_openai_api_version: "2024-08-01-preview".to_string(),
        ollama_url: "http://localhost:11434".to_string(),
        ollama_model: "llama3.2".to_string(),
        local_utc_offset: "-03:00".to_string(),
        reminder_window_minutes: 7,
        sweep_interval_minutes: 5,
        http_timeout_secs: 15,
        template_language: "pt_BR".to_string(),
        template_reminder_24h: "reminder_24h".to_string(),
        template_reminder_1h: "reminder_1h".to_string(),
        template_confirmation: "booking_confirmation".to_string(),
    }
}

struct TestApp {
    state: Arc<AppState>,
    messaging: Arc<MockMessaging>,
    llm_calls: Arc<Mutex<usize>>,
}

impl TestApp {
    fn new(config: AppConfig) -> Self {
        let utc_offset = parse_utc_offset(&config.local_utc_offset).unwrap();
        let conn = db::init_db(":memory:").unwrap();
        let store: Arc<dyn BookingStore> =
            Arc::new(SqliteBookingStore::new(Arc::new(Mutex::new(conn))));
        let messaging = Arc::new(MockMessaging::default());

        let sender = TemplateReminderSender::new(
            messaging.clone(),
            ReminderTemplates {
                language: config.template_language.clone(),
                day_before: config.template_reminder_24h.clone(),
                hour_before: config.template_reminder_1h.clone(),
            },
        );
        let scheduler = Arc::new(ReminderScheduler::new(
            store.clone(),
            Arc::new(sender),
            config.reminder_window(),
        ));

        let llm_calls = Arc::new(Mutex::new(0));
        let llm = Box::new(MockLlm {
            calls: Arc::clone(&llm_calls),
        });

        let state = Arc::new(AppState {
            config,
            utc_offset,
            store,
            llm,
            messaging: messaging.clone(),
            scheduler,
        });

        Self {
            state,
            messaging,
            llm_calls,
        }
    }

    fn router(&self) -> Router {
        handlers::router(Arc::clone(&self.state))
    }

    fn llm_calls(&self) -> usize {
        *self.llm_calls.lock().unwrap()
    }
}

fn text_payload(id: &str, body: &str) -> String {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "display_phone_number": "551130000000", "phone_number_id": "PNID" },
                    "messages": [{
                        "id": id,
                        "from": CUSTOMER,
                        "timestamp": "1724160000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

fn webhook_request(body: String) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/json")
        .body(Body::from(body))
        .unwrap()
}

fn admin_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", "Bearer test-token")
        .body(Body::empty())
        .unwrap()
}

async fn json_body(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    let hex: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("sha256={hex}")
}

// ── Health & Verification ──

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_body(res).await["status"], "ok");
}

#[tokio::test]
async fn test_verify_handshake_echoes_challenge() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"12345");
}

#[tokio::test]
async fn test_verify_handshake_rejects_wrong_token() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

// ── Inbound Messages ──

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request("{not json".to_string()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(app.messaging.sent().is_empty());
}

#[tokio::test]
async fn test_payload_without_entry_is_bad_request() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(r#"{"entry":[]}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let json = json_body(res).await;
    assert!(json["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_status_callback_is_acknowledged_silently() {
    let app = TestApp::new(test_config());
    let body = r#"{"entry":[{"changes":[{"value":{"metadata":{"phone_number_id":"PNID"},"statuses":[{"id":"wamid.1","status":"read"}]}}]}]}"#;
    let res = app
        .router()
        .oneshot(webhook_request(body.to_string()))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(app.messaging.sent().is_empty());
    assert_eq!(app.llm_calls(), 0);
}

#[tokio::test]
async fn test_complete_schedule_creates_booking_with_reminders() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.book1", "please book everything")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let booking = app
        .state
        .store
        .get(&BookingKey::new(CUSTOMER, "wamid.book1"))
        .await
        .unwrap()
        .expect("booking stored");

    assert_eq!(booking.name.as_deref(), Some("Ana Souza"));
    assert_eq!(booking.channel_route.as_deref(), Some("PNID"));
    let appointment = booking.appointment_utc.unwrap();
    assert_eq!(appointment.to_rfc3339(), "2099-08-20T17:00:00+00:00");
    let day = booking.reminder_24h.unwrap();
    let hour = booking.reminder_1h.unwrap();
    assert!(day.due_at < hour.due_at && hour.due_at < appointment);
    assert_eq!(day.status, ReminderStatus::Pending);
    assert_eq!(hour.status, ReminderStatus::Pending);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Booking registered"));

    let templates = app.messaging.templates_to(CUSTOMER);
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "booking_confirmation");
    assert_eq!(
        templates[0].parameters,
        vec!["Ana Souza", "Company website", "20/08/2099", "14h"]
    );

    let owner = app.messaging.texts_to(OWNER);
    assert_eq!(owner.len(), 1);
    assert!(owner[0].contains("New booking"));
    assert!(owner[0].contains("bring mockups"));
}

#[tokio::test]
async fn test_unresolvable_date_still_books_without_reminders() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.vague", "book vaguely")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let booking = app
        .state
        .store
        .get(&BookingKey::new(CUSTOMER, "wamid.vague"))
        .await
        .unwrap()
        .expect("booking stored");

    assert_eq!(booking.raw_date.as_deref(), Some("next week"));
    assert!(booking.appointment_utc.is_none());
    assert!(booking.reminder_24h.is_none());
    assert!(booking.reminder_1h.is_none());
}

#[tokio::test]
async fn test_incomplete_schedule_prompts_for_missing_fields() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.partial", "I want to book")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("the service you need"));
    assert!(texts[0].contains("the time"));
    assert!(texts[0].contains("a phone number or e-mail"));
    assert!(!texts[0].contains("your full name"));

    let stored = app
        .state
        .store
        .get(&BookingKey::new(CUSTOMER, "wamid.partial"))
        .await
        .unwrap();
    assert!(stored.is_none());
    assert!(app.messaging.texts_to(OWNER).is_empty());
}

#[tokio::test]
async fn test_handoff_notifies_owner() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.h", "let me talk to a human")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let owner = app.messaging.texts_to(OWNER);
    assert_eq!(owner.len(), 1);
    assert!(owner[0].contains("Human requested"));
    assert!(owner[0].contains(CUSTOMER));

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Eng. Carvalho"));
}

#[tokio::test]
async fn test_info_question_without_details_prompts_for_fields() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.i", "what do you do?")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("To complete your booking"));
    assert!(texts[0].contains("your full name"));
    assert!(texts[0].contains("a phone number or e-mail"));
}

#[tokio::test]
async fn test_info_question_with_all_fields_gets_generic_reply() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.p", "what about pricing?")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("pick a service"));

    // Only a schedule intent creates a booking
    let stored = app
        .state
        .store
        .get(&BookingKey::new(CUSTOMER, "wamid.p"))
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_unreadable_extraction_prompts_for_fields() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.g", "gibberish")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app.llm_calls(), 1);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("To complete your booking"));
}

#[tokio::test]
async fn test_non_text_message_skips_extraction() {
    let app = TestApp::new(test_config());
    let body = serde_json::json!({
        "entry": [{ "changes": [{ "value": {
            "metadata": { "phone_number_id": "PNID" },
            "messages": [{ "id": "wamid.img", "from": CUSTOMER, "type": "image", "image": { "id": "media1" } }]
        }}]}]
    })
    .to_string();

    let res = app.router().oneshot(webhook_request(body)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app.llm_calls(), 0);

    let texts = app.messaging.texts_to(CUSTOMER);
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("as text"));
}

// ── Signature Validation ──

#[tokio::test]
async fn test_signature_required_when_secret_configured() {
    let mut config = test_config();
    config.whatsapp_app_secret = "app-secret".to_string();
    let app = TestApp::new(config);

    let res = app
        .router()
        .oneshot(webhook_request(text_payload("wamid.s", "what do you do?")))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(app.messaging.sent().is_empty());
}

#[tokio::test]
async fn test_valid_signature_is_accepted() {
    let mut config = test_config();
    config.whatsapp_app_secret = "app-secret".to_string();
    let app = TestApp::new(config);

    let body = text_payload("wamid.s", "what do you do?");
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/json")
        .header("X-Hub-Signature-256", sign("app-secret", &body))
        .body(Body::from(body))
        .unwrap();

    let res = app.router().oneshot(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(app.messaging.texts_to(CUSTOMER).len(), 1);
}

// ── Admin API ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(
            Request::builder()
                .uri("/api/admin/bookings")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_lists_bookings() {
    let app = TestApp::new(test_config());
    app.router()
        .oneshot(webhook_request(text_payload("wamid.book1", "book everything")))
        .await
        .unwrap();

    let res = app
        .router()
        .oneshot(admin_request("GET", "/api/admin/bookings"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let json = json_body(res).await;
    let bookings = json.as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["booking_id"], "wamid.book1");
    assert_eq!(bookings[0]["appointment_utc"], "2099-08-20T17:00:00Z");
    assert_eq!(bookings[0]["reminder_1h"]["status"], "pending");
    assert_eq!(bookings[0]["reminder_1h"]["due_at"], "2099-08-20T16:00:00Z");
}

#[tokio::test]
async fn test_admin_customer_bookings_not_found() {
    let app = TestApp::new(test_config());
    let res = app
        .router()
        .oneshot(admin_request("GET", "/api/admin/bookings/5500000000000"))
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_sweep_sends_due_reminder_once() {
    let app = TestApp::new(test_config());
    let now = Utc::now().duration_trunc(Duration::seconds(1)).unwrap();
    let key = BookingKey::new(CUSTOMER, "due-soon");

    // 1h reminder fell due two minutes ago; the 24h one is long past
    app.state
        .store
        .upsert_merge(
            &key,
            &BookingFields {
                name: Some("Ana Souza".to_string()),
                service: Some("Company website".to_string()),
                raw_time: Some("14h".to_string()),
                channel_route: Some("PNID".to_string()),
                ..Default::default()
            }
            .with_appointment(now + Duration::minutes(58)),
        )
        .await
        .unwrap();

    let res = app
        .router()
        .oneshot(admin_request("POST", "/api/admin/sweep"))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report = json_body(res).await;
    assert_eq!(report["dispatched"], 1);
    assert_eq!(report["missed"], 1);
    assert_eq!(report["missed_day_before"], 1);

    let templates = app.messaging.templates_to(CUSTOMER);
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].name, "reminder_1h");
    assert_eq!(templates[0].parameters, vec!["Ana Souza", "Company website"]);

    let booking = app.state.store.get(&key).await.unwrap().unwrap();
    assert_eq!(booking.reminder_1h.unwrap().status, ReminderStatus::Sent);
    assert_eq!(booking.reminder_24h.unwrap().status, ReminderStatus::Pending);

    // Second sweep does not resend
    let res = app
        .router()
        .oneshot(admin_request("POST", "/api/admin/sweep"))
        .await
        .unwrap();
    assert_eq!(json_body(res).await["dispatched"], 0);
    assert_eq!(app.messaging.templates_to(CUSTOMER).len(), 1);

    let res = app
        .router()
        .oneshot(admin_request("GET", "/api/admin/status"))
        .await
        .unwrap();
    let status = json_body(res).await;
    assert_eq!(status["window_minutes"], 7);
    assert_eq!(status["utc_offset"], "-03:00");
    assert_eq!(status["last_sweep"]["scanned"], 1);
}

#[tokio::test]
async fn test_sweep_skips_reminder_already_sent() {
    let app = TestApp::new(test_config());
    let now = Utc::now().duration_trunc(Duration::seconds(1)).unwrap();
    let key = BookingKey::new(CUSTOMER, "sent-already");

    app.state
        .store
        .upsert_merge(
            &key,
            &BookingFields {
                channel_route: Some("PNID".to_string()),
                reminder_1h: Some(Reminder {
                    due_at: now - Duration::minutes(1),
                    status: ReminderStatus::Sent,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let report = app.state.scheduler.tick(Utc::now()).await;
    assert_eq!(report.dispatched, 0);
    assert!(app.messaging.sent().is_empty());
}
