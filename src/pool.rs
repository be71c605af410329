use std::net::IpAddr;

/// Alternate server addresses used to route retries around a failing path.
///
/// Candidates behave as a stack: the most recently discovered address is
/// tried first, and a handed-out address is never reissued. One address can
/// be marked as known-bad; population filters it out so a retry never goes
/// back to the server that just failed.
#[derive(Clone, Debug, Default)]
pub struct ServerPool {
    candidates: Vec<IpAddr>,
    excluded: Option<IpAddr>,
}

impl ServerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pops the most recently added candidate, if any remain.
    pub fn next(&mut self) -> Option<IpAddr> {
        self.candidates.pop()
    }

    /// Installs `addresses` minus the known-bad one. Does nothing while
    /// candidates remain, so fresh discovery never clobbers a live pool.
    pub fn populate(&mut self, addresses: Vec<IpAddr>) {
        if !self.candidates.is_empty() {
            return;
        }
        let excluded = self.excluded;
        self.candidates = addresses
            .into_iter()
            .filter(|address| Some(*address) != excluded)
            .collect();
    }

    /// Marks `address` as known-bad for subsequent population.
    pub fn exclude(&mut self, address: IpAddr) {
        self.excluded = Some(address);
    }

    /// Forgets the known-bad marker. Called at the start of each dispatch.
    pub fn clear_excluded(&mut self) {
        self.excluded = None;
    }

    /// Replaces the candidate set outright, bypassing discovery.
    pub fn seed(&mut self, addresses: Vec<IpAddr>) {
        self.candidates = addresses;
    }

    pub fn candidates(&self) -> &[IpAddr] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }
}
