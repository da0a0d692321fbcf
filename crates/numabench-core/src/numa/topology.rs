//! # Host NUMA Topology
//!
//! Reads the NUMA layout of the running host from sysfs
//! (`/sys/devices/system/node/`). The benchmark's configured domains are
//! checked against it and, when no domains are configured, derived from it.
//! Hosts without sysfs NUMA information are treated as a single node.

use std::path::Path;

use super::NumaError;

const SYSFS_NODE_PATH: &str = "/sys/devices/system/node";
const SYSFS_ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";

/// NUMA layout of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumaTopology {
    /// CPUs per node (index = node ID)
    cpus_per_node: Vec<Vec<usize>>,
    /// Memory per node in bytes (index = node ID)
    memory_per_node: Vec<u64>,
    /// CPU to NUMA node mapping (`None` = CPU not listed by any node)
    cpu_to_node: Vec<Option<usize>>,
}

impl NumaTopology {
    /// Detects the host topology.
    ///
    /// Never fails: falls back to a single node holding every online CPU.
    #[must_use]
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            match Self::detect_sysfs(Path::new(SYSFS_NODE_PATH)) {
                Ok(topo) => return topo,
                Err(e) => tracing::debug!("NUMA sysfs detection unavailable: {e}"),
            }
        }

        Self::from_node_cpus(vec![online_cpus()])
    }

    /// Builds a topology from explicit per-node CPU lists.
    #[must_use]
    pub fn from_node_cpus(cpus_per_node: Vec<Vec<usize>>) -> Self {
        let num_cpus = cpus_per_node
            .iter()
            .flatten()
            .max()
            .map_or(0, |max| max + 1);
        let mut cpu_to_node = vec![None; num_cpus];
        for (node, cpus) in cpus_per_node.iter().enumerate() {
            for &cpu in cpus {
                cpu_to_node[cpu] = Some(node);
            }
        }
        let memory_per_node = vec![0; cpus_per_node.len()];

        Self {
            cpus_per_node,
            memory_per_node,
            cpu_to_node,
        }
    }

    /// A single node owning CPUs `0..num_cpus`.
    #[must_use]
    pub fn single_node(num_cpus: usize) -> Self {
        Self::from_node_cpus(vec![(0..num_cpus.max(1)).collect()])
    }

    /// Reads node directories (`nodeN/cpulist`, `nodeN/meminfo`) below `root`.
    fn detect_sysfs(root: &Path) -> Result<Self, NumaError> {
        use std::fs;

        let entries = fs::read_dir(root)
            .map_err(|e| NumaError::TopologyError(format!("Failed to read {}: {e}", root.display())))?;

        let mut node_ids: Vec<usize> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .and_then(|name| name.strip_prefix("node"))
                    .and_then(|id| id.parse::<usize>().ok())
            })
            .collect();

        if node_ids.is_empty() {
            return Err(NumaError::TopologyError("No NUMA nodes found".to_string()));
        }
        node_ids.sort_unstable();

        let num_nodes = node_ids.last().map_or(1, |max| max + 1);
        let mut cpus_per_node = vec![Vec::new(); num_nodes];
        let mut memory_per_node = vec![0u64; num_nodes];

        for &node in &node_ids {
            let node_dir = root.join(format!("node{node}"));
            if let Ok(cpulist) = fs::read_to_string(node_dir.join("cpulist")) {
                cpus_per_node[node] = parse_cpulist(cpulist.trim());
            }
            if let Ok(meminfo) = fs::read_to_string(node_dir.join("meminfo")) {
                memory_per_node[node] = parse_meminfo(&meminfo);
            }
        }

        let mut topo = Self::from_node_cpus(cpus_per_node);
        topo.memory_per_node = memory_per_node;
        Ok(topo)
    }

    /// Returns the number of NUMA nodes.
    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.cpus_per_node.len()
    }

    /// Returns the number of CPUs known to any node.
    #[must_use]
    pub fn num_cpus(&self) -> usize {
        self.cpu_to_node.iter().filter(|node| node.is_some()).count()
    }

    /// Returns the CPUs belonging to `node`, empty if the node is unknown.
    #[must_use]
    pub fn cpus_for_node(&self, node: usize) -> &[usize] {
        self.cpus_per_node.get(node).map_or(&[], Vec::as_slice)
    }

    /// Returns the memory (in bytes) of `node`.
    #[must_use]
    pub fn memory_for_node(&self, node: usize) -> u64 {
        self.memory_per_node.get(node).copied().unwrap_or(0)
    }

    /// Returns the node owning `cpu`.
    #[must_use]
    pub fn node_for_cpu(&self, cpu: usize) -> Option<usize> {
        self.cpu_to_node.get(cpu).copied().flatten()
    }

    /// Returns the CPU the calling thread currently runs on.
    #[must_use]
    pub fn current_cpu() -> usize {
        #[cfg(target_os = "linux")]
        {
            // SAFETY: sched_getcpu takes no arguments and only reads the current CPU
            let cpu = unsafe { libc::sched_getcpu() };
            if let Ok(cpu) = usize::try_from(cpu) {
                return cpu;
            }
        }

        0
    }

    /// Returns true if the host has more than one node.
    #[must_use]
    pub fn is_numa(&self) -> bool {
        self.num_nodes() > 1
    }

    /// Logs the topology.
    pub fn log_topology(&self) {
        tracing::info!(
            "Host NUMA topology: {} nodes, {} CPUs",
            self.num_nodes(),
            self.num_cpus()
        );
        for node in 0..self.num_nodes() {
            let cpus = self.cpus_for_node(node);
            tracing::info!(
                "  Node {}: {} CPUs ({:?}), {} GiB memory",
                node,
                cpus.len(),
                cpus,
                self.memory_for_node(node) >> 30
            );
        }
    }
}

/// Parses a CPU list such as `"0-7,16-23"`.
pub(crate) fn parse_cpulist(s: &str) -> Vec<usize> {
    let mut cpus = Vec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.parse::<usize>(), end.parse::<usize>()) {
                cpus.extend(start..=end);
            }
        } else if let Ok(cpu) = part.parse::<usize>() {
            cpus.push(cpu);
        }
    }

    cpus
}

/// Extracts `MemTotal` from a per-node meminfo file, in bytes.
fn parse_meminfo(s: &str) -> u64 {
    // "Node 0 MemTotal:       32654844 kB"
    s.lines()
        .find(|line| line.contains("MemTotal"))
        .and_then(|line| {
            // The node id is numeric too; the size is the number before "kB"
            let parts: Vec<&str> = line.split_whitespace().collect();
            parts
                .windows(2)
                .find(|pair| pair[1] == "kB")
                .and_then(|pair| pair[0].parse::<u64>().ok())
                .map(|kib| kib * 1024)
        })
        .unwrap_or(0)
}

/// Returns the online CPU ids of the host.
#[must_use]
pub fn online_cpus() -> Vec<usize> {
    std::fs::read_to_string(SYSFS_ONLINE_CPUS)
        .map(|online| parse_cpulist(online.trim()))
        .ok()
        .filter(|cpus| !cpus.is_empty())
        .unwrap_or_else(|| (0..num_cpus::get()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let topo = NumaTopology::detect();
        assert!(topo.num_nodes() >= 1);
    }

    #[test]
    fn test_parse_cpulist() {
        assert_eq!(parse_cpulist("0"), vec![0]);
        assert_eq!(parse_cpulist("0-3"), vec![0, 1, 2, 3]);
        assert_eq!(parse_cpulist("0,2,4"), vec![0, 2, 4]);
        assert_eq!(parse_cpulist("0-3,8-11"), vec![0, 1, 2, 3, 8, 9, 10, 11]);
        assert!(parse_cpulist("").is_empty());
    }

    #[test]
    fn test_parse_meminfo() {
        let meminfo = "Node 0 MemTotal:       1024 kB\nNode 0 MemFree:         512 kB\n";
        assert_eq!(parse_meminfo(meminfo), 1024 * 1024);
        assert_eq!(parse_meminfo("garbage"), 0);
    }

    #[test]
    fn test_parse_meminfo_ignores_node_id() {
        assert_eq!(parse_meminfo("Node 3 MemTotal:       4096 kB\n"), 4096 * 1024);
        assert_eq!(parse_meminfo("Node 0 MemTotal:   32654844 kB"), 32_654_844 * 1024);
        assert_eq!(parse_meminfo("Node 1 MemTotal:"), 0);
    }

    #[test]
    fn test_from_node_cpus() {
        let topo = NumaTopology::from_node_cpus(vec![vec![0, 2], vec![1, 3]]);
        assert_eq!(topo.num_nodes(), 2);
        assert_eq!(topo.num_cpus(), 4);
        assert!(topo.is_numa());
        assert_eq!(topo.node_for_cpu(2), Some(0));
        assert_eq!(topo.node_for_cpu(3), Some(1));
        assert_eq!(topo.node_for_cpu(9), None);
        assert_eq!(topo.cpus_for_node(1), &[1, 3]);
        assert!(topo.cpus_for_node(7).is_empty());
    }

    #[test]
    fn test_sysfs_layout() {
        let dir = tempfile::tempdir().unwrap();
        for (node, cpus) in [(0, "0-1"), (1, "2-3")] {
            let node_dir = dir.path().join(format!("node{node}"));
            std::fs::create_dir(&node_dir).unwrap();
            std::fs::write(node_dir.join("cpulist"), format!("{cpus}\n")).unwrap();
            std::fs::write(
                node_dir.join("meminfo"),
                format!("Node {node} MemTotal:       2048 kB\n"),
            )
            .unwrap();
        }
        std::fs::create_dir(dir.path().join("power")).unwrap();

        let topo = NumaTopology::detect_sysfs(dir.path()).unwrap();
        assert_eq!(topo.num_nodes(), 2);
        assert_eq!(topo.cpus_for_node(1), &[2, 3]);
        assert_eq!(topo.memory_for_node(0), 2048 * 1024);
        assert_eq!(topo.memory_for_node(1), 2048 * 1024);
    }

    #[test]
    fn test_single_node() {
        let topo = NumaTopology::single_node(4);
        assert_eq!(topo.num_nodes(), 1);
        assert!(!topo.is_numa());
        assert_eq!(topo.node_for_cpu(3), Some(0));
    }

    #[test]
    fn test_online_cpus_not_empty() {
        assert!(!online_cpus().is_empty());
    }
}
