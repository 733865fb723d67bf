use argh::FromArgs;
use serde::Deserialize;
use std::path::PathBuf;

use kornia_matching::{verify_matches, Correspondence, TransformModel, VerifyConfig};

#[derive(FromArgs)]
/// Verify keypoint matches between two images
struct Args {
    /// path to the JSON file with keypoints and matches
    #[argh(option)]
    input_path: PathBuf,

    /// path to a JSON verification config
    #[argh(option)]
    config_path: Option<PathBuf>,

    /// path to write the verification report as JSON
    #[argh(option)]
    output_path: Option<PathBuf>,
}

/// Keypoints of both images and the one-directional descriptor matches.
#[derive(Deserialize)]
struct MatchInput {
    keypoints_a: Vec<[f64; 2]>,
    keypoints_b: Vec<[f64; 2]>,
    matches_a_to_b: Vec<(usize, usize)>,
    matches_b_to_a: Vec<(usize, usize)>,
}

fn to_correspondences(pairs: &[(usize, usize)]) -> Vec<Correspondence> {
    pairs.iter().map(|&p| p.into()).collect()
}

fn describe(model: &TransformModel) -> String {
    let m = model.to_mat33();
    format!(
        "[{:.4}, {:.4}, {:.4}; {:.4}, {:.4}, {:.4}; {:.6}, {:.6}, {:.4}]",
        m[0][0], m[0][1], m[0][2], m[1][0], m[1][1], m[1][2], m[2][0], m[2][1], m[2][2]
    )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let input: MatchInput = serde_json::from_str(&std::fs::read_to_string(&args.input_path)?)?;
    println!(
        "Keypoints: #{} in A, #{} in B",
        input.keypoints_a.len(),
        input.keypoints_b.len()
    );

    let config = match &args.config_path {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => VerifyConfig::default(),
    };
    log::info!("Verification config: {config:?}");

    let matches_a_to_b = to_correspondences(&input.matches_a_to_b);
    let matches_b_to_a = to_correspondences(&input.matches_b_to_a);

    let report = verify_matches(
        &input.keypoints_a,
        &input.keypoints_b,
        &matches_a_to_b,
        &matches_b_to_a,
        &config,
    )?;

    println!("Forward matches: #{}", matches_a_to_b.len());
    println!("Mutual matches: #{}", report.mutual.len());
    println!("Neighborhood consensus: #{}", report.consensus.len());
    println!(
        "RANSAC {:?} inliers: #{} ({:.1}% of mutual)",
        report.ransac.model.transform_type(),
        report.inliers.len(),
        report.inlier_ratio() * 100.0
    );
    println!("Model: {}", describe(&report.ransac.model));

    if let Some(path) = &args.output_path {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
