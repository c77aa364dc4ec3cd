use std::collections::HashMap;

use super::DownloadRequest;

/// Requests of one batch sharing a destination key, in arrival order.
///
/// Never empty; one group maps to one transfer.
#[derive(Debug, Clone)]
pub struct Group {
    destination_key: String,
    requests: Vec<DownloadRequest>,
}

impl Group {
    pub fn destination_key(&self) -> &str {
        &self.destination_key
    }

    pub fn requests(&self) -> &[DownloadRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// The most recently arrived request; it carries the group's progress messages.
    pub fn primary(&self) -> &DownloadRequest {
        self.requests
            .last()
            .expect("groups are built with at least one request")
    }

    /// Every request except the primary, in arrival order.
    pub fn merged(&self) -> &[DownloadRequest] {
        &self.requests[..self.requests.len() - 1]
    }

    pub fn sources(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.source().to_string()).collect()
    }
}

/// Partition a batch by destination key.
///
/// Groups are ordered by first appearance of their key; each request lands
/// in exactly one group.
pub fn group_by_destination(batch: Vec<DownloadRequest>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for request in batch {
        match index.get(request.destination_key()) {
            Some(&i) => groups[i].requests.push(request),
            None => {
                index.insert(request.destination_key().to_string(), groups.len());
                groups.push(Group {
                    destination_key: request.destination_key().to_string(),
                    requests: vec![request],
                });
            }
        }
    }

    groups
}
