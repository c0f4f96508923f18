// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Adjacency between the run groups of one labeling pass, used for the
//! topology queries on [Region](crate::region::Region): neighbours, enclosed
//! regions and enclosing regions.
//!
//! The graph spans every group of admissible runs, including groups that the
//! size filter rejected, so containment is decided on the whole scanned
//! picture. Pixels whose value is outside the value range are not part of
//! any group; a region whose surroundings are partly excluded may therefore
//! appear enclosed. Label the full value range when topology matters.
//!
//! A group B is enclosed by a group A when B is not A and every path of
//! adjacent groups from B to a group touching the scan rectangle edge passes
//! through A.

use crate::labeler::UNASSIGNED;

#[derive(Debug, Default)]
pub(crate) struct RegionGraph {
    enabled: bool,
    // Adjacent pairs; run indices while linking, group indices once finished.
    edges: Vec<(u32, u32)>,
    // Per group: index of its region, or UNASSIGNED if the size filter
    // rejected it.
    group_spans: Vec<u32>,
    group_border: Vec<bool>,
    // adjacent[starts[g]..starts[g+1]] are the groups next to group g, sorted.
    starts: Vec<u32>,
    adjacent: Vec<u32>,
}

impl RegionGraph {
    pub fn reset(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.edges.clear();
        self.group_spans.clear();
        self.group_border.clear();
        self.starts.clear();
        self.adjacent.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Records that runs `a` and `b` (indices into the pass's run list) touch.
    pub fn add_run_edge(&mut self, a: usize, b: usize) {
        self.edges.push((a as u32, b as u32));
    }

    /// Converts the recorded run edges into group adjacency. `run_groups`
    /// gives each run's group; `groups` yields (region index or UNASSIGNED,
    /// touches border) per group.
    pub fn finish(&mut self, run_groups: &[u32],
                  groups: impl Iterator<Item = (u32, bool)>) {
        for (span, border) in groups {
            self.group_spans.push(span);
            self.group_border.push(border);
        }
        let num_groups = self.group_spans.len();
        let num_run_edges = self.edges.len();
        for i in 0..num_run_edges {
            let (a, b) = self.edges[i];
            let (ga, gb) = (run_groups[a as usize], run_groups[b as usize]);
            self.edges[i] = (ga, gb);
            self.edges.push((gb, ga));
        }
        self.edges.sort_unstable();
        self.edges.dedup();

        self.starts.resize(num_groups + 1, 0);
        for &(a, _) in &self.edges {
            self.starts[a as usize + 1] += 1;
        }
        for g in 0..num_groups {
            self.starts[g + 1] += self.starts[g];
        }
        self.adjacent.extend(self.edges.iter().map(|&(_, b)| b));
    }

    pub fn group_count(&self) -> usize {
        self.group_spans.len()
    }

    pub fn group_span(&self, group: u32) -> Option<usize> {
        match self.group_spans.get(group as usize) {
            Some(&span) if span != UNASSIGNED => Some(span as usize),
            _ => None,
        }
    }

    pub fn neighbours(&self, group: u32) -> &[u32] {
        let g = group as usize;
        if g + 1 >= self.starts.len() {
            return &[];
        }
        &self.adjacent[self.starts[g] as usize..self.starts[g + 1] as usize]
    }

    // Appends the groups reachable from `start` without stepping on a
    // visited group to `component`, marking them visited. Returns whether
    // none of them touches the border.
    fn explore(&self, start: u32, visited: &mut [bool], component: &mut Vec<u32>) -> bool {
        let mut enclosed = true;
        let mut next = component.len();
        visited[start as usize] = true;
        component.push(start);
        while next < component.len() {
            let group = component[next];
            next += 1;
            enclosed &= !self.group_border[group as usize];
            for &n in self.neighbours(group) {
                if !visited[n as usize] {
                    visited[n as usize] = true;
                    component.push(n);
                }
            }
        }
        enclosed
    }

    pub fn encloses(&self, outer: u32, inner: u32) -> bool {
        if outer == inner {
            return false;
        }
        let mut visited = vec![false; self.group_count()];
        visited[outer as usize] = true;
        let mut component = Vec::new();
        self.explore(inner, &mut visited, &mut component)
    }

    /// Groups enclosed by `outer`, in ascending (discovery) order. With
    /// `direct_only`, just those adjacent to `outer`.
    pub fn enclosed_groups(&self, outer: u32, direct_only: bool) -> Vec<u32> {
        let mut visited = vec![false; self.group_count()];
        visited[outer as usize] = true;
        let mut enclosed = Vec::new();
        let mut component = Vec::new();
        let around = self.neighbours(outer);
        for &start in around {
            if visited[start as usize] {
                continue;
            }
            component.clear();
            if self.explore(start, &mut visited, &mut component) {
                if direct_only {
                    enclosed.extend(component.iter().filter(|&&g| around.binary_search(&g).is_ok()));
                } else {
                    enclosed.extend_from_slice(&component);
                }
            }
        }
        enclosed.sort_unstable();
        enclosed
    }

    /// The neighbour of `inner` that encloses it, if any.
    pub fn enclosing_group(&self, inner: u32) -> Option<u32> {
        self.neighbours(inner).iter().copied().find(|&n| self.encloses(n, inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Group layout (B = touches border):
    //   0B surrounds 1 and 3; 1 surrounds 2; 3 also touches 4B.
    fn nested_graph() -> RegionGraph {
        let mut graph = RegionGraph::default();
        graph.reset(true);
        // One run per group; run i belongs to group i.
        for (a, b) in [(0, 1), (1, 2), (0, 3), (1, 0), (3, 4), (0, 4)] {
            graph.add_run_edge(a, b);
        }
        let run_groups = [0, 1, 2, 3, 4];
        graph.finish(&run_groups, [(0, true), (1, false), (UNASSIGNED, false),
                                   (2, false), (3, true)].into_iter());
        graph
    }

    #[test]
    fn test_adjacency() {
        let graph = nested_graph();
        assert_eq!(graph.group_count(), 5);
        assert_eq!(graph.neighbours(0), &[1, 3, 4]);
        assert_eq!(graph.neighbours(1), &[0, 2]);
        assert_eq!(graph.neighbours(2), &[1]);
        assert_eq!(graph.neighbours(3), &[0, 4]);
        assert!(graph.neighbours(9).is_empty());
        assert_eq!(graph.group_span(2), None);
        assert_eq!(graph.group_span(3), Some(2));
    }

    #[test]
    fn test_containment() {
        let graph = nested_graph();
        assert!(graph.encloses(0, 1));
        assert!(graph.encloses(1, 2));
        assert!(graph.encloses(0, 2));
        assert!(!graph.encloses(1, 0));
        assert!(!graph.encloses(1, 1));
        // 3 reaches the border through 4.
        assert!(!graph.encloses(0, 3));
        assert_eq!(graph.enclosed_groups(0, true), vec![1]);
        assert_eq!(graph.enclosed_groups(0, false), vec![1, 2]);
        assert_eq!(graph.enclosed_groups(1, false), vec![2]);
        assert!(graph.enclosed_groups(3, false).is_empty());
        assert_eq!(graph.enclosing_group(2), Some(1));
        assert_eq!(graph.enclosing_group(1), Some(0));
        assert_eq!(graph.enclosing_group(3), None);
        assert_eq!(graph.enclosing_group(0), None);
    }

    #[test]
    fn test_reset() {
        let mut graph = nested_graph();
        graph.reset(false);
        assert!(!graph.is_enabled());
        assert_eq!(graph.group_count(), 0);
        assert!(graph.neighbours(0).is_empty());
    }
}
