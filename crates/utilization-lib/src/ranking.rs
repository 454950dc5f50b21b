//! Namespace CPU usage ranking

use crate::models::NamespaceRank;
use std::collections::HashMap;

/// Number of namespaces reported per pass
pub const TOP_NAMESPACES: usize = 5;

/// Per-namespace CPU cores accumulated over one pass
///
/// Iteration order is the order in which namespaces were first seen, which
/// is what breaks ties when ranking.
#[derive(Debug, Clone, Default)]
pub struct NamespaceUsage {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl NamespaceUsage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `cores` to the namespace's running total
    pub fn add(&mut self, namespace: &str, cores: f64) {
        match self.index.get(namespace) {
            Some(&i) => self.entries[i].1 += cores,
            None => {
                self.index.insert(namespace.to_string(), self.entries.len());
                self.entries.push((namespace.to_string(), cores));
            }
        }
    }

    pub fn get(&self, namespace: &str) -> Option<f64> {
        self.index.get(namespace).map(|&i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(ns, cores)| (ns.as_str(), *cores))
    }
}

impl<'a> FromIterator<(&'a str, f64)> for NamespaceUsage {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut usage = NamespaceUsage::new();
        for (namespace, cores) in iter {
            usage.add(namespace, cores);
        }
        usage
    }
}

/// The `n` heaviest namespaces, descending, in millicores
///
/// The sort is stable, so equal usage keeps first-seen order.
pub fn top_n(usage: &NamespaceUsage, n: usize) -> Vec<NamespaceRank> {
    let mut ranked: Vec<(&str, f64)> = usage.iter().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(n)
        .map(|(namespace, cores)| NamespaceRank {
            namespace: namespace.to_string(),
            cpu_millicores: (cores * 1000.0).round() as i64,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(ranks: &[NamespaceRank]) -> Vec<&str> {
        ranks.iter().map(|r| r.namespace.as_str()).collect()
    }

    #[test]
    fn test_top_five_descending() {
        let usage: NamespaceUsage = [
            ("a", 3.0),
            ("b", 1.0),
            ("c", 5.0),
            ("d", 2.0),
            ("e", 4.0),
            ("f", 0.5),
        ]
        .into_iter()
        .collect();

        let top = top_n(&usage, TOP_NAMESPACES);
        assert_eq!(names(&top), vec!["c", "a", "e", "b", "d"]);
        assert_eq!(top[0].cpu_millicores, 5000);
        assert_eq!(top[4].cpu_millicores, 2000);
    }

    #[test]
    fn test_empty_usage() {
        assert!(top_n(&NamespaceUsage::new(), TOP_NAMESPACES).is_empty());
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let usage: NamespaceUsage = [("z", 1.0), ("y", 2.0), ("x", 1.0), ("w", 2.0)]
            .into_iter()
            .collect();

        let top = top_n(&usage, 10);
        assert_eq!(names(&top), vec!["y", "w", "z", "x"]);
    }

    #[test]
    fn test_accumulates_per_namespace() {
        let mut usage = NamespaceUsage::new();
        usage.add("kube-system", 0.25);
        usage.add("default", 0.1);
        usage.add("kube-system", 0.5);

        assert_eq!(usage.len(), 2);
        assert_eq!(usage.get("kube-system"), Some(0.75));
        assert_eq!(usage.get("default"), Some(0.1));
        assert_eq!(usage.get("missing"), None);
    }

    #[test]
    fn test_millicores_are_rounded() {
        let usage: NamespaceUsage = [("a", 0.0014), ("b", 0.0016), ("c", 0.000_25)]
            .into_iter()
            .collect();

        let top = top_n(&usage, TOP_NAMESPACES);
        assert_eq!(top[0].cpu_millicores, 2);
        assert_eq!(top[1].cpu_millicores, 1);
        assert_eq!(top[2].cpu_millicores, 0);
    }
}
