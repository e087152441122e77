//! # comprehensive raft tests
//!
//! why: verify the raft state machine in isolation from any network or disk
//! relations: tests raft-core only; multi-node runs live in seqlog-broker's tests
//! what: election, vote handling, replication, commit rules, ready hand-off, restore

use raft_core::{
    AppendEntriesRequest, AppendEntriesResponse, HardState, LogEntry, NodeState, RaftConfig,
    RaftNode, VoteRequest, VoteResponse,
};

fn vote(term: u64, from: u64, granted: bool) -> VoteResponse {
    VoteResponse {
        term,
        vote_granted: granted,
        node_id: from,
    }
}

fn ack(term: u64, from: u64, match_index: u64) -> AppendEntriesResponse {
    AppendEntriesResponse {
        term,
        success: true,
        node_id: from,
        match_index,
        last_log_index: match_index,
    }
}

fn nack(term: u64, from: u64, last_log_index: u64) -> AppendEntriesResponse {
    AppendEntriesResponse {
        term,
        success: false,
        node_id: from,
        match_index: 0,
        last_log_index,
    }
}

/// Make node 1 leader of a fresh 3-node cluster in term 1. Its log then
/// holds the blank entry at index 1.
fn leader_of_three() -> RaftNode {
    let mut node = RaftNode::new(1, vec![1, 2, 3]);
    node.start_election();
    assert!(node.handle_vote_response(&vote(1, 2, true)));
    node
}

// =============================================================================
// SECTION 1: INITIALIZATION TESTS
// =============================================================================

mod initialization {
    use super::*;

    #[test]
    fn new_node_starts_as_follower() {
        let node = RaftNode::new(1, vec![1, 2, 3]);
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 0);
        assert_eq!(node.voted_for, None);
        assert!(node.log.is_empty());
        assert_eq!(node.commit_index, 0);
        assert_eq!(node.last_applied, 0);
        assert_eq!(node.leader_id, None);
    }

    #[test]
    fn default_config_values() {
        let config = RaftConfig::default();
        assert_eq!(config.election_timeout_min, 150);
        assert_eq!(config.election_timeout_max, 300);
        assert_eq!(config.heartbeat_interval, 50);
    }

    #[test]
    fn restore_rebuilds_term_vote_and_log() {
        let entries = vec![LogEntry::new(1, 1, vec![]), LogEntry::new(2, 2, b"x".to_vec())];
        let node = RaftNode::restore(
            2,
            vec![1, 2, 3],
            RaftConfig::default(),
            HardState {
                term: 2,
                voted_for: Some(1),
            },
            entries,
        )
        .unwrap();

        assert_eq!(node.current_term, 2);
        assert_eq!(node.voted_for, Some(1));
        assert_eq!(node.log.last_index(), 2);
        assert_eq!(node.commit_index, 0);
        assert_eq!(node.state, NodeState::Follower);
    }
}

// =============================================================================
// SECTION 2: QUORUM CALCULATION TESTS
// =============================================================================

mod quorum {
    use super::*;

    #[test]
    fn quorum_sizes() {
        assert_eq!(RaftNode::new(1, vec![1]).quorum_size(), 1);
        assert_eq!(RaftNode::new(1, vec![1, 2]).quorum_size(), 2);
        assert_eq!(RaftNode::new(1, vec![1, 2, 3]).quorum_size(), 2);
        assert_eq!(RaftNode::new(1, vec![1, 2, 3, 4, 5]).quorum_size(), 3);
    }

    #[test]
    fn own_vote_alone_is_not_a_quorum() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();
        assert!(!node.has_quorum());
    }
}

// =============================================================================
// SECTION 3: ELECTION TESTS
// =============================================================================

mod election {
    use super::*;

    #[test]
    fn start_election_becomes_candidate() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let request = node.start_election();

        assert_eq!(node.state, NodeState::Candidate);
        assert_eq!(node.current_term, 1);
        assert_eq!(node.voted_for, Some(1));
        assert_eq!(
            request,
            VoteRequest {
                term: 1,
                candidate_id: 1,
                last_log_index: 0,
                last_log_term: 0,
            }
        );
    }

    #[test]
    fn vote_request_includes_log_info() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.log.push(LogEntry::new(2, 2, vec![2]));
        node.current_term = 2;

        let request = node.start_election();
        assert_eq!(request.term, 3);
        assert_eq!(request.last_log_index, 2);
        assert_eq!(request.last_log_term, 2);
    }

    #[test]
    fn majority_vote_wins_election() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();

        assert!(node.handle_vote_response(&vote(1, 2, true)));
        assert_eq!(node.state, NodeState::Leader);
        assert_eq!(node.leader_id, Some(1));
    }

    #[test]
    fn rejected_votes_dont_count() {
        let mut node = RaftNode::new(1, vec![1, 2, 3, 4, 5]);
        node.start_election();

        assert!(!node.handle_vote_response(&vote(1, 2, false)));
        assert!(!node.handle_vote_response(&vote(1, 3, true)));
        assert_eq!(node.state, NodeState::Candidate);
        assert_eq!(node.votes_received.len(), 2);
    }

    #[test]
    fn duplicate_votes_dont_count_twice() {
        let mut node = RaftNode::new(1, vec![1, 2, 3, 4, 5]);
        node.start_election();

        node.handle_vote_response(&vote(1, 2, true));
        node.handle_vote_response(&vote(1, 2, true));
        assert_eq!(node.state, NodeState::Candidate);
    }

    #[test]
    fn votes_from_strangers_are_ignored() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();

        assert!(!node.handle_vote_response(&vote(1, 9, true)));
        assert_eq!(node.state, NodeState::Candidate);
    }

    #[test]
    fn stale_vote_response_ignored() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election(); // term 1
        node.start_election(); // term 2

        assert!(!node.handle_vote_response(&vote(1, 2, true)));
        assert_eq!(node.state, NodeState::Candidate);
    }

    #[test]
    fn vote_response_with_higher_term_steps_down() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();

        node.handle_vote_response(&vote(5, 2, false));
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 5);
        assert_eq!(node.voted_for, None);
    }

    #[test]
    fn only_candidate_processes_vote_responses() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        assert!(!node.handle_vote_response(&vote(0, 2, true)));
        assert_eq!(node.state, NodeState::Follower);
    }

    #[test]
    fn single_node_wins_election_immediately() {
        let mut node = RaftNode::new(1, vec![1]);
        node.start_election();
        assert_eq!(node.state, NodeState::Leader);
        // the blank entry commits with a quorum of one
        assert_eq!(node.commit_index, 1);
    }
}

// =============================================================================
// SECTION 4: VOTE REQUEST HANDLING
// =============================================================================

mod vote_request {
    use super::*;

    fn request(term: u64, candidate_id: u64, last_log_index: u64, last_log_term: u64) -> VoteRequest {
        VoteRequest {
            term,
            candidate_id,
            last_log_index,
            last_log_term,
        }
    }

    #[test]
    fn grant_vote_to_valid_candidate() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let (response, reset) = node.handle_vote_request(&request(1, 2, 0, 0));

        assert!(response.vote_granted);
        assert_eq!(response.term, 1);
        assert_eq!(response.node_id, 1);
        assert!(reset);
        assert_eq!(node.voted_for, Some(2));
    }

    #[test]
    fn reject_vote_for_lower_term() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.current_term = 5;

        let (response, reset) = node.handle_vote_request(&request(3, 2, 0, 0));
        assert!(!response.vote_granted);
        assert_eq!(response.term, 5);
        assert!(!reset);
    }

    #[test]
    fn higher_term_request_demotes_leader() {
        let mut node = leader_of_three();
        let (response, _) = node.handle_vote_request(&request(7, 3, 10, 1));

        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 7);
        assert!(response.vote_granted);
    }

    #[test]
    fn reject_vote_if_already_voted() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.handle_vote_request(&request(1, 2, 0, 0));

        let (response, _) = node.handle_vote_request(&request(1, 3, 0, 0));
        assert!(!response.vote_granted);
        assert_eq!(node.voted_for, Some(2));
    }

    #[test]
    fn can_revote_for_same_candidate() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.handle_vote_request(&request(1, 2, 0, 0));

        let (response, _) = node.handle_vote_request(&request(1, 2, 0, 0));
        assert!(response.vote_granted);
    }

    #[test]
    fn reject_candidate_with_stale_log_lower_term() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(5, 1, vec![1]));
        node.current_term = 5;

        let (response, _) = node.handle_vote_request(&request(6, 2, 1, 3));
        assert!(!response.vote_granted);
        // the term is still adopted even though the vote is refused
        assert_eq!(node.current_term, 6);
        assert_eq!(node.voted_for, None);
    }

    #[test]
    fn reject_candidate_with_shorter_log_same_term() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.log.push(LogEntry::new(1, 2, vec![2]));
        node.current_term = 1;

        let (response, _) = node.handle_vote_request(&request(2, 2, 1, 1));
        assert!(!response.vote_granted);
    }

    #[test]
    fn grant_vote_to_candidate_with_higher_term_log() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.log.push(LogEntry::new(1, 2, vec![1]));
        node.current_term = 2;

        let (response, _) = node.handle_vote_request(&request(3, 2, 1, 2));
        assert!(response.vote_granted);
    }

    #[test]
    fn granted_vote_marks_hard_state_dirty() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.handle_vote_request(&request(4, 3, 0, 0));

        let ready = node.take_ready();
        assert_eq!(
            ready.hard_state,
            Some(HardState {
                term: 4,
                voted_for: Some(3)
            })
        );
    }
}

// =============================================================================
// SECTION 5: LEADER STATE
// =============================================================================

mod leader_state {
    use super::*;

    #[test]
    fn become_leader_clears_votes() {
        let node = leader_of_three();
        assert!(node.votes_received.is_empty());
    }

    #[test]
    fn become_leader_appends_blank_entry() {
        let node = leader_of_three();
        assert_eq!(node.log.last_index(), 1);
        assert!(node.log.get(1).unwrap().is_blank());
        assert_eq!(node.log.get(1).unwrap().term, 1);
    }

    #[test]
    fn become_leader_initializes_next_index_past_existing_log() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.current_term = 1;
        node.start_election();
        node.handle_vote_response(&vote(2, 2, true));

        assert_eq!(node.next_index.get(&2), Some(&2));
        assert_eq!(node.next_index.get(&3), Some(&2));
        assert_eq!(node.match_index.get(&2), Some(&0));
        assert_eq!(node.match_index.get(&3), Some(&0));
    }

    #[test]
    fn become_follower_clears_election_state() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();

        node.become_follower(5, Some(3));
        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 5);
        assert_eq!(node.voted_for, None);
        assert_eq!(node.leader_id, Some(3));
        assert!(node.votes_received.is_empty());
    }

    #[test]
    fn followers_cannot_append() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        assert!(node.append_entry(b"cmd".to_vec()).is_none());
        assert!(node.create_append_entries(2).is_none());
    }
}

// =============================================================================
// SECTION 6: LOG REPLICATION (LEADER SIDE)
// =============================================================================

mod replication {
    use super::*;

    #[test]
    fn append_entry_increments_index() {
        let mut node = leader_of_three();
        let a = node.append_entry(b"cmd1".to_vec()).unwrap();
        let b = node.append_entry(b"cmd2".to_vec()).unwrap();

        assert_eq!(a.index, 2);
        assert_eq!(b.index, 3);
        assert_eq!(b.term, 1);
    }

    #[test]
    fn append_entries_carries_missing_suffix() {
        let mut node = leader_of_three();
        node.append_entry(b"cmd1".to_vec());

        let request = node.create_append_entries(2).unwrap();
        assert_eq!(request.prev_log_index, 0);
        assert_eq!(request.prev_log_term, 0);
        assert_eq!(request.entries.len(), 2);
        assert_eq!(request.leader_commit, 0);
    }

    #[test]
    fn append_entries_respects_batch_limit() {
        let config = RaftConfig {
            max_append_entries: 2,
            ..RaftConfig::default()
        };
        let mut node = RaftNode::with_config(1, vec![1, 2, 3], config);
        node.start_election();
        node.handle_vote_response(&vote(1, 2, true));
        for i in 0..5u8 {
            node.append_entry(vec![i + 1]);
        }

        let request = node.create_append_entries(2).unwrap();
        assert_eq!(request.entries.len(), 2);
        assert!(node.peer_lagging(2));
    }

    #[test]
    fn caught_up_peer_gets_heartbeat() {
        let mut node = leader_of_three();
        node.handle_append_entries_response(&ack(1, 2, 1));

        let request = node.create_append_entries(2).unwrap();
        assert!(request.is_heartbeat());
        assert_eq!(request.prev_log_index, 1);
        assert_eq!(request.prev_log_term, 1);
        assert!(!node.peer_lagging(2));
    }

    #[test]
    fn success_response_updates_match_and_next_index() {
        let mut node = leader_of_three();
        node.append_entry(b"cmd".to_vec());

        node.handle_append_entries_response(&ack(1, 2, 2));
        assert_eq!(node.match_index.get(&2), Some(&2));
        assert_eq!(node.next_index.get(&2), Some(&3));
    }

    #[test]
    fn failure_response_backs_up_to_follower_log_end() {
        let mut node = leader_of_three();
        for _ in 0..5 {
            node.append_entry(b"cmd".to_vec());
        }
        node.next_index.insert(2, 6);

        node.handle_append_entries_response(&nack(1, 2, 2));
        assert_eq!(node.next_index.get(&2), Some(&3));

        node.handle_append_entries_response(&nack(1, 2, 10));
        assert_eq!(node.next_index.get(&2), Some(&2));
    }

    #[test]
    fn failure_never_backs_up_past_match_index() {
        let mut node = leader_of_three();
        node.append_entry(b"cmd".to_vec());
        node.handle_append_entries_response(&ack(1, 2, 2));

        node.handle_append_entries_response(&nack(1, 2, 0));
        assert_eq!(node.next_index.get(&2), Some(&3));
    }

    #[test]
    fn higher_term_response_causes_step_down() {
        let mut node = leader_of_three();
        node.handle_append_entries_response(&nack(5, 2, 0));

        assert_eq!(node.state, NodeState::Follower);
        assert_eq!(node.current_term, 5);
        assert!(node.next_index.is_empty());
    }

    #[test]
    fn non_leader_ignores_append_entries_response() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        assert!(!node.handle_append_entries_response(&ack(0, 2, 1)));
    }
}

// =============================================================================
// SECTION 7: APPEND ENTRIES HANDLING (FOLLOWER SIDE)
// =============================================================================

mod append_entries {
    use super::*;

    fn request(
        term: u64,
        prev_log_index: u64,
        prev_log_term: u64,
        entries: Vec<LogEntry>,
        leader_commit: u64,
    ) -> AppendEntriesRequest {
        AppendEntriesRequest {
            term,
            leader_id: 2,
            prev_log_index,
            prev_log_term,
            entries,
            leader_commit,
        }
    }

    #[test]
    fn reject_append_entries_with_lower_term() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.current_term = 5;

        let (response, reset) = node.handle_append_entries(&request(3, 0, 0, vec![], 0));
        assert!(!response.success);
        assert_eq!(response.term, 5);
        assert!(!reset);
    }

    #[test]
    fn accept_heartbeat_from_valid_leader() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let (response, reset) = node.handle_append_entries(&request(1, 0, 0, vec![], 0));

        assert!(response.success);
        assert!(reset);
        assert_eq!(node.leader_id, Some(2));
        assert_eq!(node.current_term, 1);
    }

    #[test]
    fn candidate_steps_down_on_append_entries() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.start_election();

        node.handle_append_entries(&request(1, 0, 0, vec![], 0));
        assert_eq!(node.state, NodeState::Follower);
        // same term: the vote cast for ourselves stands
        assert_eq!(node.voted_for, Some(1));
    }

    #[test]
    fn reject_append_entries_with_missing_prev_entry() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.current_term = 1;

        let (response, reset) = node.handle_append_entries(&request(1, 4, 1, vec![], 0));
        assert!(!response.success);
        assert!(reset);
        assert_eq!(response.last_log_index, 1);
    }

    #[test]
    fn reject_append_entries_with_conflicting_prev_term() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.log.push(LogEntry::new(1, 2, vec![2]));
        node.current_term = 1;

        let (response, _) = node.handle_append_entries(&request(2, 2, 2, vec![], 0));
        assert!(!response.success);
        assert_eq!(response.last_log_index, 1);
    }

    #[test]
    fn append_entries_adds_to_log() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let entries = vec![LogEntry::new(1, 1, vec![1]), LogEntry::new(1, 2, vec![2])];

        let (response, _) = node.handle_append_entries(&request(1, 0, 0, entries, 0));
        assert!(response.success);
        assert_eq!(response.match_index, 2);
        assert_eq!(node.log.last_index(), 2);
    }

    #[test]
    fn append_entries_truncates_conflicting_entries() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, vec![1]));
        node.log.push(LogEntry::new(1, 2, vec![2]));
        node.log.push(LogEntry::new(1, 3, vec![3]));
        node.current_term = 1;

        let entries = vec![LogEntry::new(2, 2, vec![20])];
        node.handle_append_entries(&request(2, 1, 1, entries, 0));

        assert_eq!(node.log.last_index(), 2);
        assert_eq!(node.log.get(2).unwrap().term, 2);
        assert_eq!(node.log.get(2).unwrap().command, vec![20]);
    }

    #[test]
    fn stale_duplicate_request_does_not_truncate() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let entries = vec![
            LogEntry::new(1, 1, vec![1]),
            LogEntry::new(1, 2, vec![2]),
            LogEntry::new(1, 3, vec![3]),
        ];
        node.handle_append_entries(&request(1, 0, 0, entries, 0));
        node.take_ready();

        // a delayed copy of an earlier, shorter batch
        let (response, _) =
            node.handle_append_entries(&request(1, 0, 0, vec![LogEntry::new(1, 1, vec![1])], 0));
        assert!(response.success);
        assert_eq!(response.match_index, 1);
        assert_eq!(node.log.last_index(), 3);
        assert!(node.take_ready().entries.is_empty());
    }

    #[test]
    fn append_entries_updates_commit_index() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let entries = vec![LogEntry::new(1, 1, vec![1]), LogEntry::new(1, 2, vec![2])];

        node.handle_append_entries(&request(1, 0, 0, entries, 1));
        assert_eq!(node.commit_index, 1);
    }

    #[test]
    fn commit_index_capped_at_last_new_entry() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        let entries = vec![LogEntry::new(1, 1, vec![1])];

        node.handle_append_entries(&request(1, 0, 0, entries, 10));
        assert_eq!(node.commit_index, 1);
    }
}

// =============================================================================
// SECTION 8: COMMIT INDEX ADVANCEMENT
// =============================================================================

mod commit_advancement {
    use super::*;

    #[test]
    fn commit_on_majority_replication() {
        let mut node = leader_of_three();
        node.append_entry(b"cmd".to_vec());

        assert!(node.handle_append_entries_response(&ack(1, 2, 2)));
        assert_eq!(node.commit_index, 2);
    }

    #[test]
    fn no_commit_without_quorum() {
        let mut node = RaftNode::new(1, vec![1, 2, 3, 4, 5]);
        node.start_election();
        node.handle_vote_response(&vote(1, 2, true));
        node.handle_vote_response(&vote(1, 3, true));
        node.append_entry(b"cmd".to_vec());

        assert!(!node.handle_append_entries_response(&ack(1, 2, 2)));
        assert_eq!(node.commit_index, 0);

        assert!(node.handle_append_entries_response(&ack(1, 3, 2)));
        assert_eq!(node.commit_index, 2);
    }

    #[test]
    fn cannot_commit_entries_from_previous_term_directly() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.log.push(LogEntry::new(1, 1, b"old".to_vec()));
        node.current_term = 1;
        node.start_election(); // term 2, blank at index 2
        node.handle_vote_response(&vote(2, 2, true));

        // the old entry alone is replicated: still not committable
        assert!(!node.handle_append_entries_response(&ack(2, 2, 1)));
        assert_eq!(node.commit_index, 0);
        assert!(!node.committed_in_current_term());

        // once the blank of term 2 is replicated, both commit
        assert!(node.handle_append_entries_response(&ack(2, 2, 2)));
        assert_eq!(node.commit_index, 2);
        assert!(node.committed_in_current_term());
    }
}

// =============================================================================
// SECTION 9: READY HAND-OFF
// =============================================================================

mod ready {
    use super::*;

    #[test]
    fn leader_ready_carries_new_entries() {
        let mut node = leader_of_three();
        node.take_ready();

        node.append_entry(b"a".to_vec());
        node.append_entry(b"b".to_vec());
        let ready = node.take_ready();

        assert!(ready.hard_state.is_none());
        assert!(ready.truncate_from.is_none());
        assert_eq!(ready.entries.len(), 2);
        assert_eq!(ready.entries[0].index, 2);
        assert!(ready.needs_persist());
    }

    #[test]
    fn committed_entries_are_handed_out_once() {
        let mut node = leader_of_three();
        node.append_entry(b"a".to_vec());
        node.handle_append_entries_response(&ack(1, 2, 2));

        let ready = node.take_ready();
        assert_eq!(ready.committed.len(), 2);
        assert_eq!(node.last_applied, 2);
        assert!(node.take_ready().committed.is_empty());
    }

    #[test]
    fn heartbeat_produces_nothing_to_persist() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.current_term = 1;
        let request = AppendEntriesRequest {
            term: 1,
            leader_id: 2,
            prev_log_index: 0,
            prev_log_term: 0,
            entries: vec![],
            leader_commit: 0,
        };
        node.handle_append_entries(&request);
        assert!(node.take_ready().is_empty());
    }
}

// =============================================================================
// SECTION 10: EDGE CASES AND INVARIANTS
// =============================================================================

mod edge_cases {
    use super::*;

    #[test]
    fn term_never_decreases() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.current_term = 10;
        node.become_follower(5, None);
        assert_eq!(node.current_term, 10);
    }

    #[test]
    fn voted_for_resets_on_term_change() {
        let mut node = RaftNode::new(1, vec![1, 2, 3]);
        node.voted_for = Some(2);
        node.current_term = 1;
        node.become_follower(2, None);
        assert_eq!(node.voted_for, None);
    }

    #[test]
    fn at_most_one_leader_per_term_among_three() {
        // two candidates in the same term split the third voter
        let mut a = RaftNode::new(1, vec![1, 2, 3]);
        let mut b = RaftNode::new(2, vec![1, 2, 3]);
        let mut c = RaftNode::new(3, vec![1, 2, 3]);

        let req_a = a.start_election();
        let req_b = b.start_election();

        let (c_to_a, _) = c.handle_vote_request(&req_a);
        let (c_to_b, _) = c.handle_vote_request(&req_b);
        let (b_to_a, _) = b.handle_vote_request(&req_a);
        let (a_to_b, _) = a.handle_vote_request(&req_b);

        a.handle_vote_response(&c_to_a);
        a.handle_vote_response(&b_to_a);
        b.handle_vote_response(&c_to_b);
        b.handle_vote_response(&a_to_b);

        let leaders = [&a, &b]
            .iter()
            .filter(|n| n.state == NodeState::Leader && n.current_term == 1)
            .count();
        assert_eq!(leaders, 1);
    }
}
