//! # Benchmark Topology
//!
//! The configured NUMA domains: which CPUs get a worker and which NVRAM
//! devices back each domain. Fixed before any worker starts.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;

use crate::numa::NumaTopology;

/// One NUMA domain of the benchmark topology.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Domain {
    /// CPUs that run a worker, in worker order
    #[serde(default)]
    pub cpus: Vec<usize>,
    /// NVRAM device paths, in round-robin order
    #[serde(default)]
    pub nvram: Vec<PathBuf>,
}

impl Domain {
    /// Creates a domain from CPU ids and device paths.
    #[must_use]
    pub fn new(cpus: Vec<usize>, nvram: Vec<PathBuf>) -> Self {
        Self { cpus, nvram }
    }
}

/// Placement of one worker within the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSlot {
    /// Global thread index (reporting order)
    pub thread_index: usize,
    /// Domain the worker's CPU belongs to
    pub domain: usize,
    /// Position of the worker within its domain
    pub domain_index: usize,
    /// CPU the worker is pinned to
    pub cpu: usize,
}

/// Ordered collection of NUMA domains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemTopology {
    domains: Vec<Domain>,
}

impl SystemTopology {
    /// Creates a topology from explicit domains.
    #[must_use]
    pub fn new(domains: Vec<Domain>) -> Self {
        Self { domains }
    }

    /// Derives a topology from the host: one domain per node, every CPU of
    /// the node gets a worker, device `/dev/dax<node>.0` backs the node.
    #[must_use]
    pub fn from_host(host: &NumaTopology) -> Self {
        let domains = (0..host.num_nodes())
            .map(|node| {
                Domain::new(
                    host.cpus_for_node(node).to_vec(),
                    vec![PathBuf::from(format!("/dev/dax{node}.0"))],
                )
            })
            .collect();
        Self { domains }
    }

    /// Returns the domains.
    #[must_use]
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    /// Returns the number of domains.
    #[must_use]
    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    /// Returns a domain by index.
    #[must_use]
    pub fn domain(&self, index: usize) -> Option<&Domain> {
        self.domains.get(index)
    }

    /// Returns the domain listing `cpu`.
    #[must_use]
    pub fn domain_of_cpu(&self, cpu: usize) -> Option<usize> {
        self.domains.iter().position(|d| d.cpus.contains(&cpu))
    }

    /// Returns the total number of workers.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.domains.iter().map(|d| d.cpus.len()).sum()
    }

    /// Enumerates workers domain by domain, CPUs in listed order.
    pub fn workers(&self) -> impl Iterator<Item = WorkerSlot> + '_ {
        self.domains
            .iter()
            .enumerate()
            .flat_map(|(domain, d)| {
                d.cpus
                    .iter()
                    .enumerate()
                    .map(move |(domain_index, &cpu)| (domain, domain_index, cpu))
            })
            .enumerate()
            .map(|(thread_index, (domain, domain_index, cpu))| WorkerSlot {
                thread_index,
                domain,
                domain_index,
                cpu,
            })
    }
}

impl fmt::Display for SystemTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "system_topology = [")?;
        for (index, domain) in self.domains.iter().enumerate() {
            writeln!(f, "    dom[{index}] = {{")?;
            write!(f, "        cpu_ids = [ ")?;
            for cpu in &domain.cpus {
                write!(f, "{cpu} ")?;
            }
            writeln!(f, "],")?;
            writeln!(f, "        nvram = [")?;
            for device in &domain.nvram {
                writeln!(f, "            \"{}\",", device.display())?;
            }
            writeln!(f, "        ],")?;
            writeln!(f, "    }},")?;
        }
        writeln!(f, "]")
    }
}
