#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Semaphore};

use mailshot::dispatch::Options;
use mailshot::entry::Recipient;
use mailshot::{Entry, ErrorKind, Event, Result, SendOutcome, Sender, Status, Template};

/// What the scripted sender does for a given address.
#[derive(Clone, Debug)]
pub enum Script {
    Fail(String),
    Fault(String),
    Panic,
}

/// Sender answering from a per-address script, `Sent` for anything not
/// scripted. Records every address it was asked to send to.
///
/// With a gate, every send waits for a permit first.
#[derive(Default)]
pub struct Scripted {
    script: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Arc<Semaphore>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some(gate),
            ..Default::default()
        })
    }

    pub fn fail(&self, email: &str, message: &str) {
        self.set(email, Script::Fail(message.to_string()));
    }

    pub fn set(&self, email: &str, script: Script) {
        self.script.lock().unwrap().insert(email.to_string(), script);
    }

    pub fn clear(&self, email: &str) {
        self.script.lock().unwrap().remove(email);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for Scripted {
    async fn send(&self, recipient: &Recipient, _: &Template) -> Result<SendOutcome> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        self.calls.lock().unwrap().push(recipient.email.clone());

        let script = self.script.lock().unwrap().get(&recipient.email).cloned();
        match script {
            None => Ok(SendOutcome::Sent),
            Some(Script::Fail(message)) => Ok(SendOutcome::Failed(message)),
            Some(Script::Fault(message)) => Err(ErrorKind::Other(message).into()),
            Some(Script::Panic) => panic!("scripted transport panic"),
        }
    }
}

pub fn options() -> Options {
    Options {
        delay: Duration::ZERO,
        ..Default::default()
    }
}

pub fn entries(emails: &[&str]) -> Vec<Entry> {
    emails
        .iter()
        .enumerate()
        .map(|(i, email)| Entry::new(i as u64 + 1, *email, "http://img/1.png", None))
        .collect()
}

pub fn template() -> Template {
    Template::new("Hi {{name}}", "<img src=\"{{imageLink}}\">")
}

/// Waits until the entry with the given address is reported as `sending`.
pub async fn wait_sending(events: &mut broadcast::Receiver<Event>, email: &str) {
    loop {
        match events.recv().await {
            Ok(Event::Updated(entry)) if entry.email == email && entry.status == Status::Sending => {
                return
            }
            Ok(_) => (),
            Err(e) => panic!("event stream ended: {e}"),
        }
    }
}

/// Waits until the controller has written back its run.
pub async fn wait_idle(controller: &mailshot::BatchController) {
    while controller.is_running() {
        tokio::task::yield_now().await;
    }
}
