// tests/decoder_integration_test.rs

mod common;

use blackbox_autotune::data_input::csv_export::export_session_csv;
use blackbox_autotune::data_input::{decode, ParseResult};
use blackbox_autotune::progress::NoProgress;
use common::*;

fn hover_rows(n: usize) -> Vec<Vec<i64>> {
    rows(n, 2000.0, |i, _| {
        let wobble = (i % 7) as i64 - 3;
        vec![wobble, -wobble, 2 * wobble, 0, 0, 0, 400]
    })
}

/// Log with the marker byte of frame `k` overwritten.
fn corrupt_marker_log(rows: &[Vec<i64>], k: usize) -> Vec<u8> {
    let mut bytes = header(&MAIN_FIELDS, &PID_HEADER);
    let mut writer = FrameWriter::new();
    let mut marker_offset = 0;
    for (i, row) in rows.iter().enumerate() {
        if i == k {
            marker_offset = writer.bytes.len();
        }
        writer.frame(row);
    }
    writer.end_of_log();
    assert!(matches!(writer.bytes[marker_offset], b'I' | b'P'));
    writer.bytes[marker_offset] = 0x00;
    bytes.extend(writer.bytes);
    bytes
}

/// Iterations kept when frame `lost` goes missing: the P-frames after it
/// are skipped until the next I-frame.
fn expected_iterations(lost: usize, n: usize) -> Vec<i64> {
    let next_intra = ((lost as i64 / I_INTERVAL) + 1) * I_INTERVAL;
    (0..n as i64)
        .filter(|&i| i < lost as i64 || i >= next_intra)
        .collect()
}

fn kept_iterations(result: &ParseResult) -> Vec<i64> {
    result
        .sessions
        .iter()
        .flat_map(|s| s.flight_data.raw.column("loopIteration").unwrap_or(&[]).to_vec())
        .collect()
}

/// Every decoded row carries exactly the values that were written.
fn assert_rows_exact(result: &ParseResult, rows: &[Vec<i64>]) {
    let names: Vec<&str> = ["loopIteration", "time"]
        .into_iter()
        .chain(MAIN_FIELDS)
        .collect();
    for session in &result.sessions {
        let raw = &session.flight_data.raw;
        let iterations = raw.column("loopIteration").unwrap();
        for (field, name) in names.iter().enumerate() {
            let column = raw.column(name).unwrap();
            for (n, &iteration) in iterations.iter().enumerate() {
                assert_eq!(
                    column[n], rows[iteration as usize][field],
                    "{} at iteration {}",
                    name, iteration
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_round_trip_through_decoder() {
        let rows = hover_rows(100);
        let bytes = build_log(&MAIN_FIELDS, &PID_HEADER, &rows);
        let result = decode(&bytes, &mut NoProgress);

        assert_eq!(result.sessions.len(), 1);
        assert_eq!(result.corrupted_frame_count, 0);
        let session = &result.sessions[0];
        let raw = &session.flight_data.raw;
        assert_eq!(raw.row_count(), 100);
        let expected_gyro: Vec<i64> = rows.iter().map(|r| r[2]).collect();
        assert_eq!(raw.column("gyroADC[0]"), Some(&expected_gyro[..]));
        let expected_time: Vec<i64> = rows.iter().map(|r| r[1]).collect();
        assert_eq!(raw.column("time"), Some(&expected_time[..]));

        let data = &session.flight_data;
        assert!((data.sample_rate_hz - 2000.0).abs() < 1e-6);
        assert!((data.throttle().values[0] - 40.0).abs() < 1e-9);
        assert_eq!(data.pid_metadata.axes[1].d, Some(46));
        assert_eq!(data.filter_settings.gyro_lpf1_static_hz, Some(250.0));
    }

    #[test]
    fn test_sessions_are_split_with_monotonic_time() {
        // Two logs back to back, the second one restarting its iteration
        // counter in the middle.
        let mut bytes = build_log(&MAIN_FIELDS, &PID_HEADER, &hover_rows(200));
        bytes.extend(header(&MAIN_FIELDS, &PID_HEADER));
        let mut writer = FrameWriter::new();
        for row in hover_rows(150) {
            writer.frame(&row);
        }
        for row in hover_rows(120) {
            writer.frame(&row);
        }
        writer.end_of_log();
        bytes.extend(writer.bytes);

        let result = decode(&bytes, &mut NoProgress);
        assert_eq!(result.corrupted_frame_count, 0);
        let counts: Vec<usize> = result.sessions.iter().map(|s| s.flight_data.frame_count).collect();
        assert_eq!(counts, vec![200, 150, 120]);
        for (n, session) in result.sessions.iter().enumerate() {
            assert_eq!(session.index, n);
            let time = &session.flight_data.gyro[0].times;
            assert!(time.windows(2).all(|w| w[1] > w[0]), "session {} time not monotonic", n);
        }
    }

    #[test]
    fn test_garbage_between_frames_counts_one_corruption() {
        let rows = hover_rows(100);
        let mut bytes = header(&MAIN_FIELDS, &PID_HEADER);
        let mut writer = FrameWriter::new();
        for (i, row) in rows.iter().enumerate() {
            writer.frame(row);
            if i == 40 {
                writer.garbage(&[0x00]);
            }
        }
        writer.end_of_log();
        bytes.extend(writer.bytes);

        let result = decode(&bytes, &mut NoProgress);
        assert_eq!(result.corrupted_frame_count, 1);
        assert_eq!(result.sessions.len(), 1);
        let session = &result.sessions[0];
        assert_eq!(session.corrupted_frame_count, 1);
        assert!(session.warnings.iter().any(|w| w.contains("Corrupt frame")));
        // P-frames 41..63 cannot be trusted after the break; I-frame 64 resumes
        assert_eq!(kept_iterations(&result), expected_iterations(41, 100));
        assert_rows_exact(&result, &rows);
    }

    #[test]
    fn test_corrupt_frame_marker_loses_one_frame() {
        let rows = hover_rows(100);
        let result = decode(&corrupt_marker_log(&rows, 41), &mut NoProgress);
        assert_eq!(result.corrupted_frame_count, 1);
        assert_eq!(kept_iterations(&result), expected_iterations(41, 100));
        assert_rows_exact(&result, &rows);
    }

    #[test]
    fn test_corrupt_intra_frame_marker() {
        let rows = hover_rows(100);
        let result = decode(&corrupt_marker_log(&rows, 32), &mut NoProgress);
        assert_eq!(result.corrupted_frame_count, 1);
        assert_eq!(result.sessions.len(), 1);
        assert!(!result.sessions[0]
            .warnings
            .iter()
            .any(|w| w.contains("time went backwards")));
        assert_eq!(kept_iterations(&result), expected_iterations(32, 100));
        assert_rows_exact(&result, &rows);
    }

    #[test]
    fn test_any_single_corrupt_marker_counts_once() {
        let rows = hover_rows(100);
        for k in 1..rows.len() {
            let result = decode(&corrupt_marker_log(&rows, k), &mut NoProgress);
            assert_eq!(result.corrupted_frame_count, 1, "frame {}", k);
            assert_eq!(kept_iterations(&result), expected_iterations(k, 100), "frame {}", k);
            assert_rows_exact(&result, &rows);
        }
    }

    #[test]
    fn test_slow_frames_become_slow_channels() {
        let rows = hover_rows(64);
        let mut bytes = header(&MAIN_FIELDS, &PID_HEADER);
        let mut writer = FrameWriter::new();
        for (i, row) in rows.iter().enumerate() {
            writer.frame(row);
            if i == 10 {
                writer.slow([1, 0]);
            }
            if i == 50 {
                writer.slow([3, 2]);
            }
        }
        writer.end_of_log();
        bytes.extend(writer.bytes);

        let result = decode(&bytes, &mut NoProgress);
        assert_eq!(result.corrupted_frame_count, 0);
        let data = &result.sessions[0].flight_data;
        assert_eq!(data.frame_count, 64);
        let modes = &data.slow["flightModeFlags"];
        assert_eq!(modes.values, vec![1.0, 3.0]);
        let aligned = modes.aligned_to(&data.gyro[0]);
        assert_eq!(aligned.len(), 64);
        assert_eq!(aligned.values[63], 3.0);
    }

    #[test]
    fn test_truncated_log_keeps_decoded_frames() {
        let bytes = build_log(&MAIN_FIELDS, &PID_HEADER, &hover_rows(64));
        let cut = &bytes[..bytes.len() - 20];
        let result = decode(cut, &mut NoProgress);
        assert_eq!(result.sessions.len(), 1);
        assert!(result.sessions[0].flight_data.frame_count >= 60);
    }

    #[test]
    fn test_empty_and_headerless_input() {
        let result = decode(&[], &mut NoProgress);
        assert!(result.sessions.is_empty());
        assert!(result.warnings.is_empty());

        let result = decode(b"not a blackbox log", &mut NoProgress);
        assert!(result.sessions.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_csv_export() {
        let bytes = build_log(&MAIN_FIELDS, &PID_HEADER, &hover_rows(50));
        let result = decode(&bytes, &mut NoProgress);
        let dir = tempfile::tempdir().unwrap();
        let path = export_session_csv(&result.sessions[0], dir.path(), "flight").unwrap();

        assert_eq!(path.file_name().unwrap(), "flight.01.csv");
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.iter().any(|l| l.starts_with("rollPID,")));
        let columns = lines
            .iter()
            .position(|l| l.starts_with("loopIteration,"))
            .unwrap();
        assert!(lines[columns].contains("time (us)"));
        assert_eq!(lines.len() - columns - 1, 50);
    }
}
