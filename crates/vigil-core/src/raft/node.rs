use super::{
    errors::RaftError,
    log::RaftLog,
    storage::{HardState, RaftStorage},
    transport::RaftTransport,
    types::{
        AppendEntriesRequest, AppendEntriesResponse, Command, LogEntry, NodeId, RaftRole, RaftStatus,
        RequestVoteRequest, RequestVoteResponse,
    },
    RaftConfig,
};
use crate::metrics::MetricsCollector;
use futures::{future::join_all, stream::FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use rand::Rng;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{futures::Notified, watch, Notify},
    time::Instant,
};
use tracing::{debug, error, info, warn};

/// Applies committed entries to the state machine, in log order, exactly once per index.
pub trait ApplyHandler: Send + Sync {
    fn apply(&self, index: u64, entry: &LogEntry);
}

impl<F> ApplyHandler for F
where
    F: Fn(u64, &LogEntry) + Send + Sync,
{
    fn apply(&self, index: u64, entry: &LogEntry) {
        self(index, entry);
    }
}

/// Where an election stands after one vote response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectionProgress {
    Pending,
    Won,
    /// The election is over without a win: a higher term was seen, or the node moved on.
    Abandoned,
}

struct RaftState {
    role: RaftRole,
    current_term: u64,
    voted_for: Option<NodeId>,
    log: RaftLog,
    commit_index: u64,
    last_applied: u64,
    leader_id: Option<NodeId>,
    next_index: HashMap<NodeId, u64>,
    match_index: HashMap<NodeId, u64>,
    votes: HashSet<NodeId>,
    election_deadline: Instant,
}

/// One Raft participant.
///
/// All protocol state sits behind a single mutex that is never held across an await:
/// RPC handlers are synchronous, and the async paths (elections, replication) build
/// their requests under the lock, release it for the network call, then re-check term
/// and role before applying the response.
pub struct RaftNode {
    id: NodeId,
    peers: Vec<NodeId>,
    config: RaftConfig,
    transport: Arc<dyn RaftTransport>,
    storage: Arc<dyn RaftStorage>,
    state: Mutex<RaftState>,
    apply_lock: Mutex<()>,
    apply_handler: Option<Arc<dyn ApplyHandler>>,
    commit_tx: watch::Sender<u64>,
    applied_tx: watch::Sender<u64>,
    epoch_tx: watch::Sender<u64>,
    replicate: Notify,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RaftNode {
    /// Creates a follower, restoring term, vote and log from `storage`.
    ///
    /// # Errors
    ///
    /// Returns [`RaftError::InvalidConfig`] for bad timings and [`RaftError::Storage`]
    /// if saved state cannot be loaded.
    pub fn new(
        id: NodeId,
        peers: Vec<NodeId>,
        config: RaftConfig,
        transport: Arc<dyn RaftTransport>,
        storage: Arc<dyn RaftStorage>,
    ) -> Result<Self, RaftError> {
        config.validate().map_err(RaftError::InvalidConfig)?;
        let persisted = storage.load()?;

        let mut peers: Vec<NodeId> = peers.into_iter().filter(|p| *p != id).collect();
        peers.sort_unstable();
        peers.dedup();

        if persisted.current_term > 0 {
            info!(
                node = id,
                term = persisted.current_term,
                entries = persisted.entries.len(),
                "restored raft state"
            );
        }

        let state = RaftState {
            role: RaftRole::Follower,
            current_term: persisted.current_term,
            voted_for: persisted.voted_for,
            log: RaftLog::from_entries(persisted.entries),
            commit_index: 0,
            last_applied: 0,
            leader_id: None,
            next_index: HashMap::new(),
            match_index: HashMap::new(),
            votes: HashSet::new(),
            election_deadline: Instant::now() + random_timeout(&config),
        };

        Ok(Self {
            id,
            peers,
            config,
            transport,
            storage,
            state: Mutex::new(state),
            apply_lock: Mutex::new(()),
            apply_handler: None,
            commit_tx: watch::channel(0).0,
            applied_tx: watch::channel(0).0,
            epoch_tx: watch::channel(0).0,
            replicate: Notify::new(),
            metrics: None,
        })
    }

    #[must_use]
    pub fn with_apply_handler(mut self, handler: Arc<dyn ApplyHandler>) -> Self {
        self.apply_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn peers(&self) -> &[NodeId] {
        &self.peers
    }

    #[must_use]
    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    #[must_use]
    pub fn role(&self) -> RaftRole {
        self.state.lock().role
    }

    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.role() == RaftRole::Leader
    }

    #[must_use]
    pub fn current_term(&self) -> u64 {
        self.state.lock().current_term
    }

    #[must_use]
    pub fn leader_id(&self) -> Option<NodeId> {
        self.state.lock().leader_id
    }

    #[must_use]
    pub fn commit_index(&self) -> u64 {
        self.state.lock().commit_index
    }

    #[must_use]
    pub fn last_applied(&self) -> u64 {
        self.state.lock().last_applied
    }

    #[must_use]
    pub fn election_deadline(&self) -> Instant {
        self.state.lock().election_deadline
    }

    /// Entries `1..=commit_index`.
    #[must_use]
    pub fn committed_entries(&self) -> Vec<LogEntry> {
        let state = self.state.lock();
        let committed = usize::try_from(state.commit_index).unwrap_or(usize::MAX);
        state.log.entries_from(1, committed)
    }

    #[must_use]
    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.state.lock().log.entries().to_vec()
    }

    #[must_use]
    pub fn status(&self) -> RaftStatus {
        let state = self.state.lock();
        let leading = state.role == RaftRole::Leader;
        RaftStatus {
            id: self.id,
            state: state.role,
            current_term: state.current_term,
            voted_for: state.voted_for,
            commit_index: state.commit_index,
            last_applied: state.last_applied,
            last_log_index: state.log.last_index(),
            leader_id: state.leader_id,
            next_index: if leading { state.next_index.iter().map(|(k, v)| (*k, *v)).collect() } else { Default::default() },
            match_index: if leading { state.match_index.iter().map(|(k, v)| (*k, *v)).collect() } else { Default::default() },
        }
    }

    #[must_use]
    pub fn commit_watch(&self) -> watch::Receiver<u64> {
        self.commit_tx.subscribe()
    }

    #[must_use]
    pub fn applied_watch(&self) -> watch::Receiver<u64> {
        self.applied_tx.subscribe()
    }

    /// Bumped on every transition into or out of leadership.
    #[must_use]
    pub fn leadership_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_tx.subscribe()
    }

    pub(crate) fn replication_requested(&self) -> Notified<'_> {
        self.replicate.notified()
    }

    /// Handles `RequestVote`.
    pub fn handle_request_vote(&self, request: &RequestVoteRequest) -> RequestVoteResponse {
        let mut state = self.state.lock();
        let mut dirty = false;

        if request.term > state.current_term {
            self.become_follower(&mut state, request.term, None);
            dirty = true;
        }

        let free_to_vote = state.voted_for.map_or(true, |v| v == request.candidate_id);
        let mut granted = request.term == state.current_term &&
            free_to_vote &&
            state.log.is_up_to_date(request.last_log_index, request.last_log_term);

        if granted {
            dirty |= state.voted_for != Some(request.candidate_id);
            state.voted_for = Some(request.candidate_id);
            state.election_deadline = Instant::now() + random_timeout(&self.config);
        }

        if dirty {
            if let Err(e) = self.persist_hard_state(&state) {
                error!(node = self.id, error = %e, "failed to persist vote, refusing it");
                granted = false;
            }
        }

        debug!(
            node = self.id,
            candidate = request.candidate_id,
            term = request.term,
            granted,
            "request vote handled"
        );
        RequestVoteResponse { term: state.current_term, vote_granted: granted }
    }

    /// Handles `AppendEntries`, applying anything newly committed before returning.
    pub fn handle_append_entries(&self, request: AppendEntriesRequest) -> AppendEntriesResponse {
        let (response, commit_advanced) = {
            let mut state = self.state.lock();

            if request.term < state.current_term {
                return AppendEntriesResponse {
                    term: state.current_term,
                    success: false,
                    match_index: 0,
                };
            }

            let term_changed = request.term > state.current_term;
            if term_changed || state.role != RaftRole::Follower {
                self.become_follower(&mut state, request.term, Some(request.leader_id));
            }
            state.leader_id = Some(request.leader_id);
            state.election_deadline = Instant::now() + random_timeout(&self.config);

            if !state.log.matches(request.prev_log_index, request.prev_log_term) {
                if term_changed {
                    self.persist_hard_state_or_log(&state);
                }
                let hint = state.log.last_index().min(request.prev_log_index.saturating_sub(1));
                debug!(
                    node = self.id,
                    prev_log_index = request.prev_log_index,
                    hint,
                    "log mismatch, rejecting append"
                );
                return AppendEntriesResponse { term: state.current_term, success: false, match_index: hint };
            }

            let last_new = request.prev_log_index + request.entries.len() as u64;
            let first_written = state.log.merge(request.prev_log_index, request.entries);
            let mut persisted = Ok(());
            if term_changed {
                persisted = self.persist_hard_state(&state);
            }
            if let (true, Some(first)) = (persisted.is_ok(), first_written) {
                persisted = self.persist_entries(&state, first);
            }
            if let Err(e) = persisted {
                error!(node = self.id, error = %e, "failed to persist appended entries");
                return AppendEntriesResponse {
                    term: state.current_term,
                    success: false,
                    match_index: request.prev_log_index,
                };
            }

            let new_commit = request.leader_commit.min(last_new);
            let advanced = new_commit > state.commit_index;
            if advanced {
                state.commit_index = new_commit;
            }

            (AppendEntriesResponse { term: state.current_term, success: true, match_index: last_new }, advanced)
        };

        if commit_advanced {
            self.on_commit_advanced();
        }
        response
    }

    /// Starts an election for the next term and collects votes until it is won or lost.
    pub async fn start_election(&self) {
        let (request, won_alone) = {
            let mut state = self.state.lock();
            if state.role == RaftRole::Leader {
                return;
            }

            state.role = RaftRole::Candidate;
            state.current_term += 1;
            state.voted_for = Some(self.id);
            state.leader_id = None;
            state.votes.clear();
            state.votes.insert(self.id);
            state.election_deadline = Instant::now() + random_timeout(&self.config);

            if let Err(e) = self.persist_hard_state(&state) {
                error!(node = self.id, error = %e, "failed to persist candidacy, abandoning election");
                return;
            }
            info!(node = self.id, term = state.current_term, "election timeout, starting election");
            self.report(&state);

            let request = RequestVoteRequest {
                term: state.current_term,
                candidate_id: self.id,
                last_log_index: state.log.last_index(),
                last_log_term: state.log.last_term(),
            };

            let won_alone = self.has_majority(state.votes.len());
            let advanced = won_alone && self.become_leader(&mut state);
            (request, won_alone.then_some(advanced))
        };

        if let Some(advanced) = won_alone {
            if advanced {
                self.on_commit_advanced();
            }
            return;
        }

        let term = request.term;
        let rpc_timeout = self.config.rpc_timeout();
        let mut responses: FuturesUnordered<_> = self
            .peers
            .iter()
            .map(|&peer| {
                let request = request.clone();
                async move {
                    let result =
                        tokio::time::timeout(rpc_timeout, self.transport.request_vote(peer, request)).await;
                    (peer, result)
                }
            })
            .collect();

        while let Some((peer, result)) = responses.next().await {
            let response = match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    debug!(node = self.id, peer, error = %e, "request vote failed");
                    continue;
                }
                Err(_) => {
                    debug!(node = self.id, peer, "request vote timed out");
                    continue;
                }
            };

            match self.handle_vote_response(peer, term, &response) {
                ElectionProgress::Pending => {}
                ElectionProgress::Won | ElectionProgress::Abandoned => return,
            }
        }

        if self.role() == RaftRole::Candidate {
            debug!(node = self.id, term, "election ended without a majority");
            if let Some(metrics) = &self.metrics {
                metrics.record_election(false);
            }
        }
    }

    /// Counts one vote response for the election held in `term`.
    pub fn handle_vote_response(
        &self,
        peer: NodeId,
        term: u64,
        response: &RequestVoteResponse,
    ) -> ElectionProgress {
        let (progress, advanced) = {
            let mut state = self.state.lock();

            if response.term > state.current_term {
                self.become_follower(&mut state, response.term, None);
                self.persist_hard_state_or_log(&state);
                return ElectionProgress::Abandoned;
            }
            if state.current_term != term {
                return ElectionProgress::Abandoned;
            }
            match state.role {
                RaftRole::Leader => return ElectionProgress::Won,
                RaftRole::Follower => return ElectionProgress::Abandoned,
                RaftRole::Candidate => {}
            }

            if response.vote_granted {
                state.votes.insert(peer);
            }
            if self.has_majority(state.votes.len()) {
                (ElectionProgress::Won, self.become_leader(&mut state))
            } else {
                (ElectionProgress::Pending, false)
            }
        };

        if advanced {
            self.on_commit_advanced();
        }
        progress
    }

    /// Sends one `AppendEntries` round to every peer. No-op unless leader.
    pub async fn replicate_once(&self) {
        if !self.is_leader() {
            return;
        }
        join_all(self.peers.iter().map(|&peer| self.replicate_to(peer))).await;
    }

    async fn replicate_to(&self, peer: NodeId) {
        let request = {
            let state = self.state.lock();
            if state.role != RaftRole::Leader {
                return;
            }
            let next = state.next_index.get(&peer).copied().unwrap_or(state.log.last_index() + 1).max(1);
            let prev_log_index = next - 1;
            let Some(prev_log_term) = state.log.term_at(prev_log_index) else {
                warn!(node = self.id, peer, next, "next index beyond log end");
                return;
            };
            AppendEntriesRequest {
                term: state.current_term,
                leader_id: self.id,
                prev_log_index,
                prev_log_term,
                entries: state.log.entries_from(next, self.config.max_entries_per_request),
                leader_commit: state.commit_index,
            }
        };

        let (term, prev, sent) = (request.term, request.prev_log_index, request.entries.len() as u64);
        let result =
            tokio::time::timeout(self.config.rpc_timeout(), self.transport.append_entries(peer, request)).await;

        match result {
            Ok(Ok(response)) => self.handle_append_response(peer, term, prev, sent, &response),
            Ok(Err(e)) => debug!(node = self.id, peer, error = %e, "append entries failed"),
            Err(_) => debug!(node = self.id, peer, "append entries timed out"),
        }
    }

    /// Folds a follower's reply to an `AppendEntries` sent in `term` that carried `sent`
    /// entries after `prev_log_index`.
    pub fn handle_append_response(
        &self,
        peer: NodeId,
        term: u64,
        prev_log_index: u64,
        sent: u64,
        response: &AppendEntriesResponse,
    ) {
        let advanced = {
            let mut state = self.state.lock();

            if response.term > state.current_term {
                info!(node = self.id, peer, term = response.term, "higher term in append response, stepping down");
                self.become_follower(&mut state, response.term, None);
                self.persist_hard_state_or_log(&state);
                return;
            }
            if state.role != RaftRole::Leader || state.current_term != term {
                return;
            }

            if response.success {
                let matched = prev_log_index + sent;
                let current = state.match_index.entry(peer).or_insert(0);
                *current = (*current).max(matched);
                let matched = *current;
                let next = state.next_index.entry(peer).or_insert(1);
                *next = (*next).max(matched + 1);
                self.advance_commit(&mut state)
            } else {
                let next = state.next_index.entry(peer).or_insert(1);
                *next = (*next).saturating_sub(1).min(response.match_index + 1).max(1);
                debug!(node = self.id, peer, next = *next, "follower log behind, backing off");
                false
            }
        };

        if advanced {
            self.on_commit_advanced();
        }
    }

    /// Appends a command to the leader's log and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`RaftError::NotLeader`] immediately on a follower or candidate, and
    /// [`RaftError::Storage`] if the entry cannot be persisted.
    pub fn propose(&self, command: Command) -> Result<u64, RaftError> {
        let (index, advanced) = {
            let mut state = self.state.lock();
            if state.role != RaftRole::Leader {
                return Err(RaftError::NotLeader { leader_hint: state.leader_id });
            }

            let term = state.current_term;
            let index = state.log.append(LogEntry::new(term, command));
            if let Err(e) = self.persist_entries(&state, index) {
                state.log.truncate(index - 1);
                return Err(e);
            }
            (index, self.advance_commit(&mut state))
        };

        if advanced {
            self.on_commit_advanced();
        }
        self.replicate.notify_one();
        debug!(node = self.id, index, "command proposed");
        Ok(index)
    }

    /// Proposes and waits until the entry commits.
    ///
    /// # Errors
    ///
    /// Besides [`Self::propose`] errors, returns [`RaftError::CommitTimeout`] if the
    /// index does not commit in time and [`RaftError::NotLeader`] if leadership was lost
    /// and the index was committed with another entry.
    pub async fn propose_and_wait(&self, command: Command, timeout: Duration) -> Result<u64, RaftError> {
        let term = self.current_term();
        let mut commits = self.commit_watch();
        let index = self.propose(command)?;

        match tokio::time::timeout(timeout, commits.wait_for(|commit| *commit >= index)).await {
            Ok(Ok(_)) => {}
            Ok(Err(_)) => return Err(RaftError::Shutdown),
            Err(_) => return Err(RaftError::CommitTimeout { index }),
        }

        let state = self.state.lock();
        if state.log.term_at(index) == Some(term) {
            Ok(index)
        } else {
            Err(RaftError::NotLeader { leader_hint: state.leader_id })
        }
    }

    /// Hands committed but unapplied entries to the apply handler. Returns how many ran.
    pub fn apply_committed(&self) -> usize {
        let _serial = self.apply_lock.lock();
        let mut applied = 0;

        loop {
            let (index, entry) = {
                let mut state = self.state.lock();
                if state.last_applied >= state.commit_index {
                    break;
                }
                let index = state.last_applied + 1;
                let Some(entry) = state.log.get(index).cloned() else {
                    break;
                };
                state.last_applied = index;
                (index, entry)
            };

            if let Some(handler) = &self.apply_handler {
                handler.apply(index, &entry);
            }
            self.applied_tx.send_replace(index);
            applied += 1;
        }
        applied
    }

    fn become_follower(&self, state: &mut RaftState, term: u64, leader: Option<NodeId>) {
        if term > state.current_term {
            state.current_term = term;
            state.voted_for = None;
        }
        let previous = state.role;
        state.role = RaftRole::Follower;
        state.leader_id = leader;
        state.votes.clear();

        if previous != RaftRole::Follower {
            info!(node = self.id, term, from = %previous, "stepping down to follower");
            if previous == RaftRole::Leader {
                state.election_deadline = Instant::now() + random_timeout(&self.config);
                self.epoch_tx.send_modify(|epoch| *epoch += 1);
            }
        }
        self.report(state);
    }

    /// Returns whether the no-op append already advanced the commit index.
    fn become_leader(&self, state: &mut RaftState) -> bool {
        state.role = RaftRole::Leader;
        state.leader_id = Some(self.id);
        state.votes.clear();

        let next = state.log.last_index() + 1;
        state.next_index = self.peers.iter().map(|p| (*p, next)).collect();
        state.match_index = self.peers.iter().map(|p| (*p, 0)).collect();

        let term = state.current_term;
        let noop_index = state.log.append(LogEntry::new(term, Command::Noop));
        if let Err(e) = self.persist_entries(state, noop_index) {
            error!(node = self.id, error = %e, "failed to persist leader no-op");
        }

        info!(node = self.id, term, "won election, now leader");
        if let Some(metrics) = &self.metrics {
            metrics.record_election(true);
        }
        self.epoch_tx.send_modify(|epoch| *epoch += 1);
        self.replicate.notify_one();
        self.report(state);

        self.advance_commit(state)
    }

    /// Commits the highest current-term index stored on a majority.
    fn advance_commit(&self, state: &mut RaftState) -> bool {
        let mut index = state.log.last_index();
        while index > state.commit_index {
            match state.log.term_at(index) {
                Some(term) if term == state.current_term => {
                    let replicated = 1 + state.match_index.values().filter(|m| **m >= index).count();
                    if self.has_majority(replicated) {
                        state.commit_index = index;
                        return true;
                    }
                }
                _ => break,
            }
            index -= 1;
        }
        false
    }

    fn on_commit_advanced(&self) {
        let commit = {
            let state = self.state.lock();
            self.report(&state);
            state.commit_index
        };
        self.commit_tx.send_replace(commit);
        self.apply_committed();
    }

    fn has_majority(&self, count: usize) -> bool {
        count * 2 > self.peers.len() + 1
    }

    fn persist_hard_state(&self, state: &RaftState) -> Result<(), RaftError> {
        self.storage.save_hard_state(&HardState { current_term: state.current_term, voted_for: state.voted_for })
    }

    fn persist_hard_state_or_log(&self, state: &RaftState) {
        if let Err(e) = self.persist_hard_state(state) {
            error!(node = self.id, error = %e, "failed to persist term and vote");
        }
    }

    /// Journals the log suffix starting at `first_index`.
    fn persist_entries(&self, state: &RaftState, first_index: u64) -> Result<(), RaftError> {
        self.storage.append_entries(first_index, &state.log.entries_from(first_index, usize::MAX))
    }

    fn report(&self, state: &RaftState) {
        if let Some(metrics) = &self.metrics {
            metrics.record_raft_state(state.role, state.current_term, state.commit_index, state.last_applied);
        }
    }
}

fn random_timeout(config: &RaftConfig) -> Duration {
    let low = config.election_timeout_min_ms;
    let high = config.election_timeout_max_ms.max(low);
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}
