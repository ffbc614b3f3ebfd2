use super::context::ServerContext;
use super::handlers::{self, Outcome, Step, Transfer};
use super::types::{ConnectionId, Phase};
use crate::protocol::parser::{LineParser, Progress, VerbMatcher};
use crate::protocol::types::{ProtocolError, Verb};

use std::io;
use tokio::io::AsyncWrite;
use tracing::debug;

enum State {
    AwaitingVerb(VerbMatcher),
    AwaitingHeaderPath(LineParser),
    HandlingVerb(Transfer),
    Done,
    Failed(ProtocolError),
}

/// Per-socket request state machine.
///
/// Bytes are fed in whatever chunks the socket produced; every parser keeps
/// its partial progress, so a request split at any byte boundary behaves the
/// same as one that arrived whole. Responses are written to `out` as soon as
/// the handler has them.
pub struct Connection {
    id: ConnectionId,
    verb: Option<Verb>,
    state: State,
    bytes_received: u64,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: ConnectionId::new(),
            verb: None,
            state: State::AwaitingVerb(VerbMatcher::new()),
            bytes_received: 0,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn phase(&self) -> Phase {
        match &self.state {
            State::AwaitingVerb(_) => Phase::AwaitingVerb,
            State::AwaitingHeaderPath(_) => Phase::AwaitingHeaderPath,
            State::HandlingVerb(_) => Phase::HandlingVerb,
            State::Done => Phase::Done,
            State::Failed(e) => Phase::from(*e),
        }
    }

    /// Consumes `input` as far as the current request allows and returns the resulting phase.
    ///
    /// Bytes arriving after a terminal phase are ignored.
    pub async fn advance<W>(
        &mut self,
        mut input: &[u8],
        ctx: &ServerContext,
        out: &mut W,
    ) -> io::Result<Phase>
    where
        W: AsyncWrite + Unpin,
    {
        self.bytes_received += input.len() as u64;

        loop {
            match &mut self.state {
                State::AwaitingVerb(matcher) => match matcher.advance(&mut input) {
                    Progress::Pending => break,
                    Progress::Failed(e) => self.fail(e),
                    Progress::Complete(verb) => {
                        debug!("Request verb {}", verb);
                        self.verb = Some(verb);
                        if verb.takes_path() {
                            let max_len = ctx.limits().max_header_len;
                            self.state = State::AwaitingHeaderPath(LineParser::new(max_len));
                        } else {
                            self.start(verb, "", ctx, out).await?;
                        }
                    }
                },
                State::AwaitingHeaderPath(line) => match line.advance(&mut input) {
                    Progress::Pending => break,
                    Progress::Failed(e) => self.fail(e),
                    Progress::Complete(path) => match self.verb {
                        Some(verb) => self.start(verb, &path, ctx, out).await?,
                        None => self.fail(ProtocolError::InvalidVerb),
                    },
                },
                State::HandlingVerb(transfer) => {
                    match transfer.advance(&mut input, ctx, out).await? {
                        Step::Pending => break,
                        Step::Finished => self.state = State::Done,
                        Step::Failed(e) => {
                            if let Some(transfer) = self.take_transfer(State::Failed(e)) {
                                transfer.abandon(ctx).await;
                            }
                        }
                    }
                }
                State::Done | State::Failed(_) => break,
            }
        }

        Ok(self.phase())
    }

    /// Called when the peer closed its write side.
    ///
    /// A connection that never sent a byte simply finishes; anything else
    /// still in progress is an error.
    pub async fn finish_input(&mut self, ctx: &ServerContext) -> Phase {
        match &self.state {
            State::AwaitingVerb(matcher) if matcher.consumed() == 0 => self.state = State::Done,
            State::AwaitingVerb(_) => self.fail(ProtocolError::InvalidVerb),
            State::AwaitingHeaderPath(_) => self.fail(ProtocolError::IncorrectDataAmount),
            State::HandlingVerb(_) => {
                let failed = State::Failed(ProtocolError::IncorrectDataAmount);
                if let Some(transfer) = self.take_transfer(failed) {
                    transfer.abandon(ctx).await;
                }
            }
            State::Done | State::Failed(_) => {}
        }
        self.phase()
    }

    /// Releases an in-flight transfer after a socket failure.
    pub async fn abandon(&mut self, ctx: &ServerContext) {
        let failed = State::Failed(ProtocolError::IncorrectDataAmount);
        if let Some(transfer) = self.take_transfer(failed) {
            transfer.abandon(ctx).await;
        }
    }

    async fn start<W>(
        &mut self,
        verb: Verb,
        path: &str,
        ctx: &ServerContext,
        out: &mut W,
    ) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        self.state = match handlers::begin(verb, path, ctx, out).await? {
            Outcome::Finished => State::Done,
            Outcome::Failed(e) => {
                debug!("{} {:?} rejected: {}", verb, path, e);
                State::Failed(e)
            }
            Outcome::Continue(transfer) => State::HandlingVerb(transfer),
        };
        Ok(())
    }

    fn fail(&mut self, error: ProtocolError) {
        debug!("Request failed: {}", error);
        self.state = State::Failed(error);
    }

    fn take_transfer(&mut self, next: State) -> Option<Transfer> {
        if !matches!(self.state, State::HandlingVerb(_)) {
            return None;
        }
        match std::mem::replace(&mut self.state, next) {
            State::HandlingVerb(transfer) => Some(transfer),
            _ => None,
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
