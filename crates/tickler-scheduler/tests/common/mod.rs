#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rusqlite::Connection;
use tickler_core::{Recurrence, ValidReminder, WallTime};
use tickler_mailer::{MailError, MailTransport, SendReport};
use tickler_scheduler::{
    DispatchSettings, JobRegistry, ReminderService, SqliteQueue, SqliteReminderStore,
};

/// How the fake relay answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
    Empty,
    Fault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Records every call and answers with the next scripted verdict, falling
/// back to the current one.
pub struct ScriptedTransport {
    verdict: Mutex<Verdict>,
    script: Mutex<VecDeque<Verdict>>,
    sent: Mutex<Vec<SentMail>>,
}

impl ScriptedTransport {
    pub fn new(verdict: Verdict) -> Self {
        Self {
            verdict: Mutex::new(verdict),
            script: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_verdict(&self, verdict: Verdict) {
        *self.verdict.lock().unwrap() = verdict;
    }

    /// Answer the next sends with `verdicts`, in order.
    pub fn script(&self, verdicts: impl IntoIterator<Item = Verdict>) {
        self.script.lock().unwrap().extend(verdicts);
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> tickler_mailer::Result<SendReport> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        let scripted = self.script.lock().unwrap().pop_front();
        let verdict = scripted.unwrap_or_else(|| *self.verdict.lock().unwrap());
        match verdict {
            Verdict::Accept => Ok(SendReport::accepted(to, "<test@relay>")),
            Verdict::Reject => Ok(SendReport::rejected(to)),
            Verdict::Empty => Ok(SendReport::default()),
            Verdict::Fault => Err(MailError::Api {
                status: 503,
                message: "relay unavailable".into(),
            }),
        }
    }
}

pub struct Harness {
    pub store: Arc<SqliteReminderStore>,
    pub queue: Arc<SqliteQueue>,
    pub transport: Arc<ScriptedTransport>,
    pub registry: Arc<JobRegistry>,
    pub service: ReminderService,
}

pub fn harness(settings: DispatchSettings) -> Harness {
    let store = Arc::new(SqliteReminderStore::new(Connection::open_in_memory().unwrap()).unwrap());
    let queue = Arc::new(SqliteQueue::new(Connection::open_in_memory().unwrap()).unwrap());
    let transport = Arc::new(ScriptedTransport::new(Verdict::Accept));
    let registry = Arc::new(JobRegistry::new());
    let service = ReminderService::new(
        store.clone(),
        queue.clone(),
        transport.clone(),
        registry.clone(),
        settings,
    );
    Harness {
        store,
        queue,
        transport,
        registry,
        service,
    }
}

/// A one-off reminder due `delta` from now. Built directly, so past instants
/// are allowed.
pub fn once_at(delta: Duration) -> ValidReminder {
    ValidReminder {
        email: "someone@example.com".into(),
        message: Some("water the plants".into()),
        subject: Some("plants".into()),
        recurrence: Recurrence::Once {
            send_at: Utc::now() + delta,
        },
    }
}

pub fn weekly_standup() -> ValidReminder {
    ValidReminder {
        email: "team@example.com".into(),
        message: None,
        subject: None,
        recurrence: Recurrence::Weekly {
            time: WallTime::new(9, 0).unwrap(),
            days_of_week: vec![1, 3, 5],
        },
    }
}
