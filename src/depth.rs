use std::fmt;

#[allow(unused_imports)]
use crate::RbTree;

/// Depth calculates minimum, maximum, average and percentile of leaf-node
/// depths in the [`RbTree`] tree. A leaf here is an empty child position,
/// so a tree with `n` entries has `n + 1` samples.
#[derive(Clone)]
pub struct Depth {
    samples: usize,
    min: usize,
    max: usize,
    total: usize,
    depths: [u64; 256],
}

impl Depth {
    pub(crate) fn new() -> Depth {
        Default::default()
    }

    pub(crate) fn sample(&mut self, depth: usize) {
        if self.samples == 0 || depth < self.min {
            self.min = depth
        }
        if self.samples == 0 || depth > self.max {
            self.max = depth
        }
        self.samples += 1;
        self.total += depth;
        self.depths[depth] += 1;
    }

    /// Return number of leaf-nodes sampled in [`RbTree`] instance.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Return minimum depth of leaf-node in [`RbTree`] instance.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Return maximum depth of leaf-node in [`RbTree`] instance.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Return the average depth of leaf-nodes in [`RbTree`] instance.
    pub fn mean(&self) -> usize {
        match self.samples {
            0 => 0,
            n => self.total / n,
        }
    }

    /// Return depth as tuple of percentiles, each tuple provides
    /// (percentile, depth). Returned percentiles from 90, 91 .. 100
    pub fn percentiles(&self) -> Vec<(u8, usize)> {
        let mut percentiles: Vec<(u8, usize)> = vec![];
        let (mut acc, mut prev_perc) = (0_u64, 90_u8);
        let iter = self.depths.iter().enumerate().filter(|(_, &item)| item > 0);
        for (depth, samples) in iter {
            acc += *samples;
            let perc = ((acc as f64 / self.samples as f64) * 100_f64) as u8;
            if perc >= prev_perc {
                percentiles.push((perc, depth));
                prev_perc = perc;
            }
        }
        percentiles
    }

    /// Convert depth statistics to JSON format, useful for plotting.
    pub fn json(&self) -> String {
        let ps: Vec<String> = self
            .percentiles()
            .into_iter()
            .map(|(p, d)| format!("\"{}\": {}", p, d))
            .collect();
        format!(
            "{{ \"min\": {}, \"mean\": {}, \"max\": {}, \"percentiles\": {{ {} }} }}",
            self.min,
            self.mean(),
            self.max,
            ps.join(", ")
        )
    }
}

/// Human readable, multi-line rendering, useful in logs.
impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "depth (min, mean, max): {:?}",
            (self.min, self.mean(), self.max)
        )?;
        for (perc, depth) in self.percentiles().into_iter() {
            writeln!(f, "  {} percentile = {}", perc, depth)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Depth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Depth{}", self.json())
    }
}

impl Default for Depth {
    fn default() -> Self {
        Depth {
            samples: 0,
            min: 0,
            max: 0,
            total: 0,
            depths: [0; 256],
        }
    }
}
