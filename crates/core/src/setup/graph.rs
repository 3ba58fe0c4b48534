//! Integration dependency graph.
//!
//! Hard dependencies are correctness edges: they must be acyclic and must
//! name registered domains. Soft (after) dependencies only bias the start
//! order; unknown soft targets are ignored and soft cycles are broken
//! silently.

use std::collections::{HashMap, HashSet};

use hearth_domain::error::ConfigError;
use hearth_domain::id::Domain;
use hearth_domain::integration::IntegrationDescriptor;

pub(crate) struct DependencyGraph {
    domains: Vec<Domain>,
    /// Per node: indices of hard dependencies.
    hard: Vec<Vec<usize>>,
    /// Per node: indices of known soft dependencies.
    soft: Vec<Vec<usize>>,
    /// First hard dependency naming an unregistered domain, if any.
    unknown: Option<(Domain, Domain)>,
}

impl DependencyGraph {
    pub(crate) fn build<'a, I>(descriptors: I) -> Self
    where
        I: IntoIterator<Item = &'a IntegrationDescriptor> + Clone,
    {
        let domains: Vec<Domain> = descriptors
            .clone()
            .into_iter()
            .map(|d| d.domain.clone())
            .collect();
        let index: HashMap<&Domain, usize> = domains
            .iter()
            .enumerate()
            .map(|(i, domain)| (domain, i))
            .collect();

        let mut hard = vec![Vec::new(); domains.len()];
        let mut soft = vec![Vec::new(); domains.len()];
        let mut unknown = None;

        for (node, descriptor) in descriptors.into_iter().enumerate() {
            let mut seen = HashSet::new();
            for dep in &descriptor.dependencies {
                match index.get(dep) {
                    Some(&dep_index) => {
                        if seen.insert(dep_index) {
                            hard[node].push(dep_index);
                        }
                    }
                    None => {
                        if unknown.is_none() {
                            unknown = Some((descriptor.domain.clone(), dep.clone()));
                        }
                    }
                }
            }
            for dep in &descriptor.after_dependencies {
                if let Some(&dep_index) = index.get(dep) {
                    if dep_index != node && seen.insert(dep_index) {
                        soft[node].push(dep_index);
                    }
                }
            }
        }

        Self {
            domains,
            hard,
            soft,
            unknown,
        }
    }

    /// Reject unknown hard dependencies and hard-dependency cycles.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownDependency`] or [`ConfigError::DependencyCycle`]
    /// naming every domain on the cycle in order.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if let Some((domain, dependency)) = &self.unknown {
            return Err(ConfigError::UnknownDependency {
                domain: domain.clone(),
                dependency: dependency.clone(),
            });
        }
        if let Some(cycle) = self.find_cycle() {
            return Err(ConfigError::DependencyCycle { cycle });
        }
        Ok(())
    }

    fn find_cycle(&self) -> Option<Vec<Domain>> {
        // 0 = unvisited, 1 = on the current path, 2 = done
        let mut colors = vec![0_u8; self.domains.len()];
        let mut path = Vec::new();
        for node in 0..self.domains.len() {
            if colors[node] == 0 {
                if let Some(cycle) = self.dfs(node, &mut colors, &mut path) {
                    return Some(cycle.into_iter().map(|i| self.domains[i].clone()).collect());
                }
            }
        }
        None
    }

    fn dfs(&self, node: usize, colors: &mut [u8], path: &mut Vec<usize>) -> Option<Vec<usize>> {
        colors[node] = 1;
        path.push(node);
        for &dep in &self.hard[node] {
            match colors[dep] {
                0 => {
                    if let Some(cycle) = self.dfs(dep, colors, path) {
                        return Some(cycle);
                    }
                }
                1 => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                _ => {}
            }
        }
        path.pop();
        colors[node] = 2;
        None
    }

    /// Preferred start order: dependencies before dependents, soft
    /// dependencies respected when possible, registration order otherwise.
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    pub(crate) fn start_order(&self) -> Vec<Domain> {
        let n = self.domains.len();
        let mut hard_unmet: Vec<usize> = self.hard.iter().map(Vec::len).collect();
        let mut soft_unmet: Vec<usize> = self.soft.iter().map(Vec::len).collect();

        let mut hard_dependents = vec![Vec::new(); n];
        let mut soft_dependents = vec![Vec::new(); n];
        for (node, deps) in self.hard.iter().enumerate() {
            for &dep in deps {
                hard_dependents[dep].push(node);
            }
        }
        for (node, deps) in self.soft.iter().enumerate() {
            for &dep in deps {
                soft_dependents[dep].push(node);
            }
        }

        let mut emitted = vec![false; n];
        let mut order = Vec::with_capacity(n);
        for _ in 0..n {
            // Prefer fully unblocked nodes; fall back to nodes held up only
            // by soft edges (this is where soft cycles get broken).
            let next = (0..n)
                .find(|&i| !emitted[i] && hard_unmet[i] == 0 && soft_unmet[i] == 0)
                .or_else(|| (0..n).find(|&i| !emitted[i] && hard_unmet[i] == 0));
            let Some(next) = next else { break };
            emitted[next] = true;
            order.push(self.domains[next].clone());
            for &dependent in &hard_dependents[next] {
                hard_unmet[dependent] -= 1;
            }
            for &dependent in &soft_dependents[next] {
                soft_unmet[dependent] = soft_unmet[dependent].saturating_sub(1);
            }
        }
        order
    }
}
