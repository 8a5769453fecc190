//! BDD step definitions for alerting and recovery

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cucumber::{given, then, when};

use app_monitor::config::{ApplicationTarget, Config, EmailConfig, WebhookConfig};
use app_monitor::email::{Mailer, OutgoingEmail};
use app_monitor::io::{HttpClient, HttpResponse};
use app_monitor::notifier::NotificationEvent;
use app_monitor::webhook::{verify, WebhookPayload, SIGNATURE_HEADER};
use app_monitor::{AppMonitorBuilder, AppMonitorError};

use crate::world::AppMonitorWorld;

// --- Test doubles ---

/// What the next GET should produce
#[derive(Debug, Clone, Copy)]
pub enum GetReply {
    Status(u16),
    Refused,
}

/// A recorded webhook POST
#[derive(Debug, Clone)]
pub struct RecordedPost {
    pub url: String,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
}

impl RecordedPost {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP client that replays scripted GET replies and records POSTs
#[derive(Debug, Default)]
pub struct RecordingHttpClient {
    pub replies: Mutex<VecDeque<GetReply>>,
    pub gets: AtomicUsize,
    pub posts: Mutex<Vec<RecordedPost>>,
    pub post_status: Mutex<Option<u16>>,
}

impl RecordingHttpClient {
    pub fn script(&self, reply: GetReply, times: usize) {
        let mut replies = self.replies.lock().unwrap();
        replies.extend(std::iter::repeat(reply).take(times));
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpClient for RecordingHttpClient {
    async fn get(&self, url: &str) -> app_monitor::Result<HttpResponse> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(GetReply::Status(200));
        match reply {
            GetReply::Status(status) => Ok(HttpResponse {
                status,
                body: String::new(),
            }),
            GetReply::Refused => Err(AppMonitorError::Http(format!(
                "GET {} failed: connection refused",
                url
            ))),
        }
    }

    async fn post_json(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(&str, &str)],
    ) -> app_monitor::Result<HttpResponse> {
        self.posts.lock().unwrap().push(RecordedPost {
            url: url.to_string(),
            body: body.to_vec(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        });
        let status = self.post_status.lock().unwrap().unwrap_or(200);
        Ok(HttpResponse {
            status,
            body: String::new(),
        })
    }
}

/// A mailer that records every submission attempt
#[derive(Debug, Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub reject: AtomicBool,
}

impl RecordingMailer {
    fn count_with_prefix(&self, prefix: &str) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|email| email.subject.starts_with(prefix))
            .count()
    }
}

#[async_trait::async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> app_monitor::Result<()> {
        self.sent.lock().unwrap().push(email.clone());
        if self.reject.load(Ordering::SeqCst) {
            Err(AppMonitorError::Email("554 rejected".to_string()))
        } else {
            Ok(())
        }
    }
}

// --- Helpers ---

async fn run_rounds(world: &mut AppMonitorWorld, reply: GetReply, rounds: usize) {
    if world.monitor.is_none() {
        let config = Config {
            applications: world.applications.clone(),
            email: world.email.clone(),
            webhook: world.webhook.clone(),
            ..Config::default()
        };
        let monitor = AppMonitorBuilder::new(config)
            .with_http_client(Arc::clone(&world.http) as Arc<dyn HttpClient>)
            .with_mailer(Arc::clone(&world.mailer) as Arc<dyn Mailer>)
            .build()
            .await
            .expect("monitor should build");
        world.monitor = Some(monitor);
    }

    world.http.script(reply, rounds);
    let monitor = world.monitor.as_ref().expect("monitor not built");
    for _ in 0..rounds {
        let events = monitor.run_round().await;
        world.events.extend(events);
    }
}

fn last_payload(world: &AppMonitorWorld) -> WebhookPayload {
    let posts = world.http.posts();
    let last = posts.last().expect("no webhook request recorded");
    serde_json::from_slice(&last.body).expect("webhook body should be a payload")
}

// --- Given steps ---

#[given(expr = "an application {string} expecting status {int}")]
fn application_expecting(world: &mut AppMonitorWorld, name: String, status: i32) {
    world.applications.push(ApplicationTarget {
        url: format!("http://{}.local/health", name),
        name,
        enabled: true,
        expected_code: status as u16,
    });
}

#[given("email alerts are configured")]
fn email_configured(world: &mut AppMonitorWorld) {
    world.email = Some(EmailConfig {
        smtp_host: "smtp.example.com".to_string(),
        smtp_port: 587,
        username: "monitor".to_string(),
        password: "secret".to_string(),
        from_email: "monitor@example.com".to_string(),
        to_email: "oncall@example.com".to_string(),
    });
}

#[given(expr = "the webhook is enabled with secret {string}")]
fn webhook_enabled(world: &mut AppMonitorWorld, secret: String) {
    world.webhook = WebhookConfig {
        enabled: true,
        url: "http://hooks.local/monitor".to_string(),
        secret: Some(secret),
    };
}

#[given("the webhook is disabled")]
fn webhook_disabled(world: &mut AppMonitorWorld) {
    world.webhook = WebhookConfig {
        enabled: false,
        url: "http://hooks.local/monitor".to_string(),
        secret: None,
    };
}

#[given("the mail server rejects messages")]
fn mail_server_rejects(world: &mut AppMonitorWorld) {
    world.mailer.reject.store(true, Ordering::SeqCst);
}

// --- When steps ---

#[when(expr = "{int} check round(s) see(s) status {int}")]
async fn rounds_see_status(world: &mut AppMonitorWorld, rounds: i32, status: i32) {
    run_rounds(world, GetReply::Status(status as u16), rounds as usize).await;
}

#[when(expr = "{int} check round(s) see(s) a refused connection")]
async fn rounds_see_refused(world: &mut AppMonitorWorld, rounds: i32) {
    run_rounds(world, GetReply::Refused, rounds as usize).await;
}

// --- Then steps ---

#[then("no notifications should have been sent")]
fn no_notifications(world: &mut AppMonitorWorld) {
    assert!(
        world.events.is_empty(),
        "Expected no events, got {:?}",
        world.events
    );
    assert!(world.mailer.sent.lock().unwrap().is_empty());
    assert!(world.http.posts().is_empty());
}

#[then(expr = "{int} alert email(s) should have been sent")]
fn alert_emails_sent(world: &mut AppMonitorWorld, expected: i32) {
    assert_eq!(world.mailer.count_with_prefix("ALERT:"), expected as usize);
}

#[then(expr = "{int} recovery email(s) should have been sent")]
fn recovery_emails_sent(world: &mut AppMonitorWorld, expected: i32) {
    assert_eq!(
        world.mailer.count_with_prefix("RECOVERY:"),
        expected as usize
    );
}

#[then(expr = "the last alert email should mention {string}")]
fn last_alert_mentions(world: &mut AppMonitorWorld, text: String) {
    let sent = world.mailer.sent.lock().unwrap();
    let last = sent
        .iter()
        .rev()
        .find(|email| email.subject.starts_with("ALERT:"))
        .expect("no alert email sent");
    assert!(
        last.body.contains(&text),
        "Expected alert body to contain '{}', got '{}'",
        text,
        last.body
    );
}

#[then(expr = "{int} webhook request(s) should have been made")]
fn webhook_requests_made(world: &mut AppMonitorWorld, expected: i32) {
    assert_eq!(world.http.posts().len(), expected as usize);
}

#[then("no webhook request should have been made")]
fn no_webhook_requests(world: &mut AppMonitorWorld) {
    assert!(world.http.posts().is_empty());
}

#[then(expr = "the last webhook payload should be {string} with status_code {int} and failure_count {int}")]
fn last_payload_is(
    world: &mut AppMonitorWorld,
    event: String,
    status_code: i32,
    failure_count: i32,
) {
    let payload = last_payload(world);
    assert_eq!(payload.event, event);
    assert_eq!(payload.status_code, status_code as u16);
    assert_eq!(payload.failure_count, failure_count as u32);
}

#[then(expr = "every webhook request should verify with secret {string}")]
fn every_request_verifies(world: &mut AppMonitorWorld, secret: String) {
    let posts = world.http.posts();
    assert!(!posts.is_empty(), "no webhook requests recorded");
    for post in posts {
        let signature = post
            .header(SIGNATURE_HEADER)
            .expect("signature header missing");
        assert!(
            verify(&secret, &post.body, signature),
            "signature {} does not match body",
            signature
        );
    }
}

#[then(expr = "the last alert should carry status_code {int} and an error")]
fn last_alert_has_error(world: &mut AppMonitorWorld, status_code: i32) {
    let alert = world
        .events
        .iter()
        .rev()
        .find(|event| event.is_alert())
        .expect("no alert raised");
    match alert {
        NotificationEvent::Alert {
            status_code: got,
            error,
            ..
        } => {
            assert_eq!(*got, status_code as u16);
            assert!(error.is_some(), "expected an error on the alert");
        }
        other => panic!("expected alert, got {:?}", other),
    }
}
