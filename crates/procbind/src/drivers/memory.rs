//! Scripted in-memory connection.
//!
//! Useful for exercising the dispatcher without a server: responses are
//! queued up front and every call is recorded for later inspection through
//! a [`MemoryHandle`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

use crate::core::traits::{Command, Connection};
use crate::core::{DataSet, SqlValue};
use crate::error::{DataAccessError, Result};

/// Identity query reported by the memory driver.
pub const MEMORY_IDENTITY_QUERY: &str = "SELECT SCOPE_IDENTITY()";

/// A scripted reply to one command.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Result sets for `fill` (and the first cell for scalars).
    Data(DataSet),
    /// Affected row count for `execute_non_query`.
    Affected(u64),
    /// Return value for `execute_return_value`.
    ReturnValue(i64),
    /// Single cell for `execute_scalar`.
    Scalar(Option<SqlValue>),
    /// The command fails with this message.
    Fail(String),
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Open,
    Close,
    Begin,
    Commit,
    Rollback,
    Execute(Command),
}

#[derive(Debug, Default)]
struct State {
    open: bool,
    in_transaction: bool,
    open_failure: Option<String>,
    queue: VecDeque<Response>,
    by_text: HashMap<String, Response>,
    events: Vec<Event>,
}

/// In-memory [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    state: Arc<Mutex<State>>,
}

/// Shared view of a [`MemoryConnection`] used to script and inspect it.
#[derive(Debug, Clone)]
pub struct MemoryHandle {
    state: Arc<Mutex<State>>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this connection's state.
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Record `command` and pick its scripted response.
    ///
    /// Queued responses are consumed first; otherwise a response registered
    /// for the command text is reused.
    fn respond(&mut self, command: &Command) -> Result<Option<Response>> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(DataAccessError::command(
                "connection is not open",
                format!("executing {}", command.text),
            ));
        }
        state.events.push(Event::Execute(command.clone()));
        trace!(text = %command.text, "memory command");

        let response = match state.queue.pop_front() {
            Some(r) => Some(r),
            None => state.by_text.get(&command.text).cloned(),
        };
        match response {
            Some(Response::Fail(message)) => Err(DataAccessError::command(
                message,
                format!("executing {}", command.text),
            )),
            other => Ok(other),
        }
    }

    fn mismatch(command: &Command, expected: &str, got: &Response) -> DataAccessError {
        DataAccessError::command(
            format!("scripted response {:?} cannot answer {}", got, expected),
            format!("executing {}", command.text),
        )
    }
}

impl MemoryHandle {
    /// Queue a response for the next command.
    pub fn push(&self, response: Response) -> &Self {
        lock(&self.state).queue.push_back(response);
        self
    }

    /// Answer every command with exactly this text, unless a queued
    /// response is pending.
    pub fn respond_to(&self, text: impl Into<String>, response: Response) -> &Self {
        lock(&self.state).by_text.insert(text.into(), response);
        self
    }

    /// Make the next `open` calls fail with `message`.
    pub fn fail_open(&self, message: impl Into<String>) -> &Self {
        lock(&self.state).open_failure = Some(message.into());
        self
    }

    /// Let `open` succeed again.
    pub fn allow_open(&self) -> &Self {
        lock(&self.state).open_failure = None;
        self
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        lock(&self.state).events.clone()
    }

    /// Commands executed so far.
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.state)
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Execute(c) => Some(c.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of times `event` was recorded.
    pub fn count(&self, event: &Event) -> usize {
        lock(&self.state).events.iter().filter(|e| *e == event).count()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    pub fn in_transaction(&self) -> bool {
        lock(&self.state).in_transaction
    }

    /// Unconsumed queued responses.
    pub fn pending(&self) -> usize {
        lock(&self.state).queue.len()
    }

    pub fn clear_events(&self) {
        lock(&self.state).events.clear();
    }
}

impl Connection for MemoryConnection {
    fn db_type(&self) -> &str {
        "memory"
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn open(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            return Ok(());
        }
        if let Some(message) = &state.open_failure {
            return Err(DataAccessError::ConnectionOpen(message.clone()));
        }
        state.open = true;
        state.events.push(Event::Open);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.open {
            state.open = false;
            // Closing discards uncommitted work.
            state.in_transaction = false;
            state.events.push(Event::Close);
        }
        Ok(())
    }

    fn fill(&mut self, command: &Command) -> Result<DataSet> {
        match self.respond(command)? {
            None => Ok(DataSet::new()),
            Some(Response::Data(set)) => Ok(set),
            Some(other) => Err(Self::mismatch(command, "fill", &other)),
        }
    }

    fn execute_non_query(&mut self, command: &Command) -> Result<u64> {
        match self.respond(command)? {
            None => Ok(0),
            Some(Response::Affected(n)) => Ok(n),
            Some(Response::Data(_)) => Ok(0),
            Some(other) => Err(Self::mismatch(command, "execute_non_query", &other)),
        }
    }

    fn execute_return_value(&mut self, command: &Command) -> Result<i64> {
        match self.respond(command)? {
            None => Ok(0),
            Some(Response::ReturnValue(v)) => Ok(v),
            Some(Response::Scalar(v)) => v.map_or(Ok(0), |v| v.to_i64()),
            Some(other) => Err(Self::mismatch(command, "execute_return_value", &other)),
        }
    }

    fn execute_scalar(&mut self, command: &Command) -> Result<Option<SqlValue>> {
        match self.respond(command)? {
            None => Ok(None),
            Some(Response::Scalar(v)) => Ok(v),
            Some(Response::ReturnValue(v)) => Ok(Some(SqlValue::I64(v))),
            Some(Response::Data(set)) => Ok(set
                .first()
                .and_then(|t| t.cell(0, 0))
                .cloned()),
            Some(other) => Err(Self::mismatch(command, "execute_scalar", &other)),
        }
    }

    fn begin_transaction(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.open {
            return Err(DataAccessError::Transaction("connection is not open".into()));
        }
        if state.in_transaction {
            return Err(DataAccessError::Transaction(
                "a transaction is already open".into(),
            ));
        }
        state.in_transaction = true;
        state.events.push(Event::Begin);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.in_transaction {
            return Err(DataAccessError::Transaction("no open transaction".into()));
        }
        state.in_transaction = false;
        state.events.push(Event::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if !state.in_transaction {
            return Err(DataAccessError::Transaction("no open transaction".into()));
        }
        state.in_transaction = false;
        state.events.push(Event::Rollback);
        Ok(())
    }

    fn identity_query(&self) -> &'static str {
        MEMORY_IDENTITY_QUERY
    }
}
