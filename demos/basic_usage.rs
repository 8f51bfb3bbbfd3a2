/// Basic usage example: analyze a synthetic sit-to-stand session
use lumbar_motion::{AnalysisPipeline, AnalysisRequest, CsvInput, ExerciseType};

/// Build a 60 Hz DOT export: three sit-to-stand cycles of `peak_deg` pitch
/// with a free-acceleration burst on each rise.
fn synthetic_export(peak_deg: f64) -> Vec<u8> {
    let mut csv = String::from("DeviceTag:,demo\nFilter Profile:,General\n");
    csv.push_str("SampleTimeFine,Quat_W,Quat_X,Quat_Y,Quat_Z,Gyr_X,Gyr_Y,Gyr_Z,FreeAcc_X,FreeAcc_Y,FreeAcc_Z,\n");

    for i in 0..600usize {
        let cycle = i % 200;
        let (pitch, acc_z) = if (40..120).contains(&cycle) {
            let phase = std::f64::consts::PI * (cycle - 40) as f64 / 80.0;
            (peak_deg * phase.sin(), 3.0 * phase.sin())
        } else {
            (0.0, 0.0)
        };
        let half = pitch.to_radians() / 2.0;
        csv.push_str(&format!(
            "{},{:.9},0,{:.9},0,0,{:.2},0,0,0,{:.3},\n",
            10_000 + i * 16_667,
            half.cos(),
            half.sin(),
            pitch,
            acc_z
        ));
    }
    csv.into_bytes()
}

fn main() {
    println!("=== Lumbar Motion: Basic Example ===\n");

    let request = AnalysisRequest {
        spine: CsvInput::new("spine.csv", synthetic_export(35.0)),
        pelvis: CsvInput::new("pelvis.csv", synthetic_export(50.0)),
        exercise: ExerciseType::SitToStand,
    };

    let pipeline = AnalysisPipeline::default();
    let response = pipeline.run(&request);

    let Some(data) = response.data.as_ref() else {
        println!("Analysis failed: {}", response.message.unwrap_or_default());
        return;
    };

    println!(
        "Recording: {} samples, {:.1} s at {:.1} Hz",
        data.metadata.total_samples, data.metadata.duration_sec, data.metadata.sample_rate
    );
    println!(
        "Spine ROM {:.1}°, pelvis ROM {:.1}°",
        data.statistics.spine.angles.rom, data.statistics.pelvis.angles.rom
    );
    if let Some(r2) = data.statistics.coordination.r_squared {
        println!("Spine-pelvis coordination R² = {:.3}", r2);
    }

    if let Some(sts) = &data.sit_to_stand_analysis {
        println!("\nRepetitions: {}", sts.repetitions);
        for detail in &sts.repetition_details {
            println!(
                "  #{} {:.2}-{:.2} s  lordosis {:.0}  hip hinge {:.0}  trunk lean {:.0}",
                detail.window.index + 1,
                detail.start_time,
                detail.end_time,
                detail.scores.lordosis,
                detail.scores.hip_hinge,
                detail.scores.trunk_lean
            );
        }
        println!(
            "Mean scores: lordosis {:.1}, hip hinge {:.1}, trunk lean {:.1}",
            sts.scores.lordosis, sts.scores.hip_hinge, sts.scores.trunk_lean
        );
    }

    for warning in &data.warnings {
        println!("warning: {}", warning);
    }
}
