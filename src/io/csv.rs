/*!
# Saving Ensemble Samples to CSV

Writes the samples of a run together with the per-particle statistics of its
[`RunSummary`]. Enable via the `csv` feature.
*/

use std::fs::File;
use std::path::Path;

use csv::Writer;

use crate::collision::Collision;
use crate::error::{BmcError, Result};
use crate::particle::Sample;
use crate::sampler::SamplerKind;
use crate::stats::RunSummary;

/**
Saves samples as a CSV file.

The resulting file has a header row `id, mass, collisions, accepted, rejected, dim_0, ...`
and one row per sample. The statistics columns are the final counters of the particle that
drew the sample, taken from `summary`.

# Examples

```rust
use brownian_mcmc::io::csv::save_samples;
use brownian_mcmc::particle::Sample;
use brownian_mcmc::stats::{ParticleSummary, RunSummary};

let summary = RunSummary {
    rounds: 1,
    particles: vec![ParticleSummary {
        id: 0,
        mass: 1.0,
        radius: 1.0,
        step_size: 0.1,
        accepted: 1,
        rejected: 0,
        collisions: 0,
    }],
    ..RunSummary::default()
};
let samples = vec![Sample { id: 0, position: vec![0.5, -1.0] }];
save_samples(&samples, &summary, "/tmp/bmc_samples.csv")?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_samples<P: AsRef<Path>>(
    samples: &[Sample],
    summary: &RunSummary,
    filename: P,
) -> Result<()> {
    let mut wtr = Writer::from_writer(File::create(filename)?);
    let n_dims = samples.first().map_or(0, |s| s.position.len());

    let mut header: Vec<String> = ["id", "mass", "collisions", "accepted", "rejected"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    header.extend((0..n_dims).map(|i| format!("dim_{}", i)));
    wtr.write_record(&header)?;

    for sample in samples {
        let particle = summary.particles.get(sample.id).ok_or_else(|| {
            BmcError::InvalidConfig(format!("sample from unknown particle {}", sample.id))
        })?;
        let mut row = vec![
            sample.id.to_string(),
            particle.mass.to_string(),
            particle.collisions.to_string(),
            particle.accepted.to_string(),
            particle.rejected.to_string(),
        ];
        row.extend(sample.position.iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}

/// File stem `{SAMPLER}_{collision}_{target}_P{particles}_R{radius}_S{samples}`.
pub fn file_stem(
    sampler: SamplerKind,
    collision: Collision,
    target: &str,
    n_particles: usize,
    radius: f64,
    n_samples: usize,
) -> String {
    format!("{sampler}_{collision}_{target}_P{n_particles}_R{radius}_S{n_samples}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ParticleSummary;
    use csv::Reader;
    use std::fs;
    use tempfile::NamedTempFile;

    fn summary() -> RunSummary {
        let particle = |id, mass, accepted, rejected, collisions| ParticleSummary {
            id,
            mass,
            radius: 1.0,
            step_size: 0.1,
            accepted,
            rejected,
            collisions,
        };
        RunSummary {
            rounds: 2,
            particles: vec![particle(0, 1.0, 2, 0, 1), particle(1, 2.5, 1, 1, 1)],
            ..RunSummary::default()
        }
    }

    #[test]
    fn test_save_samples_rows() {
        let samples = vec![
            Sample {
                id: 1,
                position: vec![0.5, -2.0],
            },
            Sample {
                id: 0,
                position: vec![1.0, 3.25],
            },
        ];
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_samples(&samples, &summary(), file.path()).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        let expected = "\
id,mass,collisions,accepted,rejected,dim_0,dim_1
1,2.5,1,1,1,0.5,-2
0,1,1,2,0,1,3.25";
        assert_eq!(contents.trim(), expected);
    }

    #[test]
    fn test_save_samples_round_trips_positions() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let samples: Vec<Sample> = (0..10)
            .map(|k| Sample {
                id: k % 2,
                position: vec![k as f64 * 0.1, -(k as f64).sqrt()],
            })
            .collect();
        let file = NamedTempFile::new()?;
        save_samples(&samples, &summary(), file.path())?;

        let mut rdr = Reader::from_path(file.path())?;
        assert_eq!(rdr.headers()?.len(), 7);
        for (record, sample) in rdr.records().zip(&samples) {
            let record = record?;
            assert_eq!(record[0].parse::<usize>()?, sample.id);
            assert_eq!(record[5].parse::<f64>()?, sample.position[0]);
            assert_eq!(record[6].parse::<f64>()?, sample.position[1]);
        }
        Ok(())
    }

    #[test]
    fn test_save_samples_empty() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        save_samples(&[], &summary(), file.path()).unwrap();
        let contents = fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.trim(), "id,mass,collisions,accepted,rejected");
    }

    #[test]
    fn test_save_samples_unknown_particle() {
        let file = NamedTempFile::new().expect("Could not create temp file");
        let samples = vec![Sample {
            id: 5,
            position: vec![0.0],
        }];
        let res = save_samples(&samples, &summary(), file.path());
        assert!(matches!(res, Err(BmcError::InvalidConfig(_))));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(
            file_stem(SamplerKind::Nuts, Collision::Elastic, "AsymMOG2d", 8, 1.0, 1000),
            "NUTS_elastic_AsymMOG2d_P8_R1_S1000"
        );
        assert_eq!(
            file_stem(SamplerKind::Hmc, Collision::None, "Gaussian", 1, 0.25, 10),
            "HMC_none_Gaussian_P1_R0.25_S10"
        );
    }
}
