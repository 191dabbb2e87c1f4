//! Push notifications about settlement activity.
//!
//! Handlers send a [`Notify`] to the [`Notifier`] actor and move on. The actor
//! fans the message out to every device token and hands each push to a
//! [`PushTransport`]. Failed pushes are logged, never reported back.
use actix::{Actor, Context, Handler, Message};
use serde::Serialize;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
}

#[derive(Error, Debug)]
pub enum PushError {
    #[error("push transport is closed")]
    Closed,
}

pub trait PushTransport {
    fn send(&self, message: &PushMessage) -> Result<(), PushError>;
}

/// Writes every push to the log.
pub struct LogTransport;

impl PushTransport for LogTransport {
    fn send(&self, message: &PushMessage) -> Result<(), PushError> {
        tracing::info!(token = %message.token, title = %message.title, "{}", message.body);
        Ok(())
    }
}

/// Resolves to the number of pushes the transport accepted.
#[derive(Message, Clone, Debug)]
#[rtype(result = "usize")]
pub struct Notify {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
}

pub struct Notifier {
    transport: Box<dyn PushTransport>,
}

impl Notifier {
    pub fn new(transport: impl PushTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
        }
    }
}

impl Actor for Notifier {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("notifier started");
    }
}

impl Handler<Notify> for Notifier {
    type Result = usize;

    fn handle(&mut self, msg: Notify, _ctx: &mut Self::Context) -> Self::Result {
        let mut delivered = 0;
        for token in msg.tokens {
            let push = PushMessage {
                token,
                title: msg.title.clone(),
                body: msg.body.clone(),
            };
            match self.transport.send(&push) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!("failed to deliver push: {err}"),
            }
        }
        delivered
    }
}
