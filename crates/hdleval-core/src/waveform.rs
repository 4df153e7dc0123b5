//! VCD parsing, trace comparison and waveform-derived repair hints.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Value changes per fully scoped signal name, in time order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub signals: BTreeMap<String, Vec<(u64, String)>>,
}

impl Trace {
    pub fn is_empty(&self) -> bool {
        self.signals.values().all(Vec::is_empty)
    }

    /// Value held by `signal` at `time`, or `None` before its first change.
    pub fn value_at(&self, signal: &str, time: u64) -> Option<&str> {
        let changes = self.signals.get(signal)?;
        let idx = changes.partition_point(|(t, _)| *t <= time);
        if idx == 0 {
            None
        } else {
            Some(changes[idx - 1].1.as_str())
        }
    }
}

/// Parse VCD text into a [`Trace`].
///
/// Understands `$scope`/`$upscope`, `$var`, `#time` stamps, the initial
/// `$dumpvars` block, scalar (`1!`) and vector (`b1010 "`) changes. Other
/// header sections are skipped. Malformed lines are ignored.
pub fn parse_vcd(text: &str) -> Trace {
    let mut codes: HashMap<String, Vec<String>> = HashMap::new();
    let mut signals: BTreeMap<String, Vec<(u64, String)>> = BTreeMap::new();
    let mut scopes: Vec<String> = Vec::new();
    let mut time = 0u64;
    let mut in_skipped_section = false;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if in_skipped_section {
            if line.contains("$end") {
                in_skipped_section = false;
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix('$') {
            let mut tokens = rest.split_whitespace();
            match tokens.next() {
                Some("scope") => {
                    // $scope module tb $end
                    if let Some(name) = tokens.nth(1) {
                        scopes.push(name.to_string());
                    }
                }
                Some("upscope") => {
                    scopes.pop();
                }
                Some("var") => {
                    // $var wire 8 # data [7:0] $end
                    let parts: Vec<&str> = tokens.collect();
                    if parts.len() >= 4 {
                        let code = parts[2].to_string();
                        let mut name = scopes.clone();
                        name.push(parts[3].to_string());
                        let full = name.join(".");
                        signals.entry(full.clone()).or_default();
                        codes.entry(code).or_default().push(full);
                    }
                }
                Some("date") | Some("version") | Some("comment") | Some("timescale") => {
                    if !line.contains("$end") {
                        in_skipped_section = true;
                    }
                }
                // $dumpvars, $dumpall, $end, $enddefinitions: values that
                // follow are handled as ordinary change lines.
                _ => {}
            }
            continue;
        }

        if let Some(stamp) = line.strip_prefix('#') {
            if let Ok(t) = stamp.trim().parse::<u64>() {
                time = t;
            }
            continue;
        }

        let (value, code) = match line.as_bytes()[0] {
            b'b' | b'B' | b'r' | b'R' => {
                let mut parts = line[1..].split_whitespace();
                match (parts.next(), parts.next()) {
                    (Some(v), Some(c)) => (v.to_ascii_lowercase(), c),
                    _ => continue,
                }
            }
            b'0' | b'1' | b'x' | b'X' | b'z' | b'Z' => {
                let (v, c) = line.split_at(1);
                let c = c.trim();
                if c.is_empty() {
                    continue;
                }
                (v.to_ascii_lowercase(), c)
            }
            _ => continue,
        };

        if let Some(names) = codes.get(code) {
            for name in names {
                if let Some(changes) = signals.get_mut(name) {
                    match changes.last_mut() {
                        // A later change at the same timestamp wins.
                        Some(last) if last.0 == time => last.1 = value.clone(),
                        _ => changes.push((time, value.clone())),
                    }
                }
            }
        }
    }

    Trace { signals }
}

/// A single (time, expected, actual) disagreement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
    pub time: u64,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalDiff {
    pub signal: String,
    pub mismatches: Vec<Mismatch>,
    /// The signals disagree at the first timestamp either trace records.
    pub initial_mismatch: bool,
}

/// Per-signal differences between a reference and a candidate trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformDiff {
    pub signals: Vec<SignalDiff>,
}

impl WaveformDiff {
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn total_mismatches(&self) -> usize {
        self.signals.iter().map(|s| s.mismatches.len()).sum()
    }

    /// One-line description, e.g. `2 signal(s) differ: tb.dut.y (3), tb.dut.z (1)`.
    pub fn summary(&self) -> String {
        if self.signals.is_empty() {
            return "waveforms match".to_string();
        }
        let parts: Vec<String> = self
            .signals
            .iter()
            .map(|s| format!("{} ({})", s.signal, s.mismatches.len()))
            .collect();
        format!("{} signal(s) differ: {}", self.signals.len(), parts.join(", "))
    }
}

/// Compare signals present in both traces over the union of their
/// change timestamps, holding each value until its next change.
pub fn compare_traces(reference: &Trace, candidate: &Trace) -> WaveformDiff {
    let mut diffs = Vec::new();

    for (name, ref_changes) in &reference.signals {
        let Some(cand_changes) = candidate.signals.get(name) else {
            continue;
        };

        let times: BTreeSet<u64> = ref_changes
            .iter()
            .chain(cand_changes.iter())
            .map(|(t, _)| *t)
            .collect();
        let first = times.iter().next().copied();

        let mut mismatches = Vec::new();
        let mut initial_mismatch = false;
        for &t in &times {
            let expected = reference.value_at(name, t).unwrap_or("x");
            let actual = candidate.value_at(name, t).unwrap_or("x");
            if expected != actual {
                if Some(t) == first {
                    initial_mismatch = true;
                }
                mismatches.push(Mismatch {
                    time: t,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
            }
        }

        if !mismatches.is_empty() {
            diffs.push(SignalDiff {
                signal: name.clone(),
                mismatches,
                initial_mismatch,
            });
        }
    }

    WaveformDiff { signals: diffs }
}

fn transitions(values: &[&str]) -> usize {
    values.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Repair hints inferred from mismatch patterns.
pub fn mismatch_hints(diff: &WaveformDiff) -> Vec<String> {
    let mut hints = Vec::new();

    for sig in &diff.signals {
        let expected: Vec<&str> = sig.mismatches.iter().map(|m| m.expected.as_str()).collect();
        let actual: Vec<&str> = sig.mismatches.iter().map(|m| m.actual.as_str()).collect();
        let expected_set: BTreeSet<&str> = expected.iter().copied().collect();
        let actual_set: BTreeSet<&str> = actual.iter().copied().collect();
        let name = &sig.signal;

        if expected_set.len() == 2 && expected_set == actual_set {
            hints.push(format!(
                "Signal '{name}' may be inverted (enable/disable logic)"
            ));
        }

        let (want, got) = (transitions(&expected), transitions(&actual));
        if want > got {
            hints.push(format!(
                "Signal '{name}' missing {} transition(s)",
                want - got
            ));
        }

        if expected_set.len() > 1 && actual_set.len() == 1 {
            hints.push(format!("Signal '{name}' is constant but should change"));
        }

        if sig.initial_mismatch {
            hints.push(format!("Signal '{name}' has wrong initial value"));
        }
    }

    hints
}

/// Ensure a testbench dumps a VCD trace to `dump_file`.
///
/// Testbenches that already call `$dumpfile`/`$dumpvars` are returned
/// unchanged. Otherwise the dump is added to the first `initial begin`
/// block, or a new `initial` block is inserted after the module header.
pub fn inject_vcd_dump(testbench: &str, dump_file: &str) -> String {
    if testbench.contains("$dumpvars") || testbench.contains("$dumpfile") {
        return testbench.to_string();
    }

    let dump = format!("$dumpfile(\"{dump_file}\");\n    $dumpvars(0);");

    if let Some(pos) = testbench.find("initial begin") {
        let end = pos + "initial begin".len();
        return format!("{}\n    {}{}", &testbench[..end], dump, &testbench[end..]);
    }

    let header_end = testbench
        .find("module")
        .and_then(|m| testbench[m..].find(';').map(|semi| m + semi + 1));
    match header_end {
        Some(end) => format!(
            "{}\ninitial begin\n    {}\nend\n{}",
            &testbench[..end],
            dump,
            &testbench[end..]
        ),
        None => format!("initial begin\n    {dump}\nend\n\n{testbench}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE: &str = r#"$date today $end
$timescale 1ns $end
$scope module tb $end
$var reg 1 ! en $end
$var wire 1 " y $end
$var wire 4 # count [3:0] $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
0!
0"
b0000 #
$end
#10
1!
1"
b0001 #
#20
0"
b0010 #
"#;

    #[test]
    fn test_parse_vcd_scopes_and_values() {
        let trace = parse_vcd(REFERENCE);
        assert_eq!(trace.signals.len(), 3);
        let y = &trace.signals["tb.y"];
        assert_eq!(
            y,
            &vec![
                (0, "0".to_string()),
                (10, "1".to_string()),
                (20, "0".to_string())
            ]
        );
        assert_eq!(trace.value_at("tb.count", 15), Some("0001"));
        assert_eq!(trace.value_at("tb.en", 25), Some("1"));
    }

    #[test]
    fn test_identical_traces_have_no_diff() {
        let trace = parse_vcd(REFERENCE);
        let diff = compare_traces(&trace, &trace);
        assert!(diff.is_empty());
        assert_eq!(diff.summary(), "waveforms match");
    }

    #[test]
    fn test_inverted_signal_hint() {
        let reference = parse_vcd(REFERENCE);
        let inverted = REFERENCE
            .replace("0\"\nb0000", "1\"\nb0000")
            .replace("1\"\nb0001", "0\"\nb0001")
            .replace("#20\n0\"", "#20\n1\"");
        let candidate = parse_vcd(&inverted);
        let diff = compare_traces(&reference, &candidate);

        assert_eq!(diff.signals.len(), 1);
        assert_eq!(diff.signals[0].signal, "tb.y");
        assert_eq!(diff.signals[0].mismatches.len(), 3);
        assert!(diff.signals[0].initial_mismatch);

        let hints = mismatch_hints(&diff);
        assert!(hints.iter().any(|h| h.contains("may be inverted")));
        assert!(hints.iter().any(|h| h.contains("wrong initial value")));
    }

    #[test]
    fn test_stuck_signal_hints() {
        let reference = parse_vcd(REFERENCE);
        let stuck = REFERENCE.replace("#10\n1!\n1\"", "#10\n1!");
        let candidate = parse_vcd(&stuck);
        let diff = compare_traces(&reference, &candidate);

        // only t=10 differs: expected 1, got held 0
        assert_eq!(diff.signals.len(), 1);
        assert_eq!(diff.signals[0].mismatches.len(), 1);
        assert!(!diff.signals[0].initial_mismatch);
        assert_eq!(diff.summary(), "1 signal(s) differ: tb.y (1)");
        assert!(mismatch_hints(&diff).is_empty());
    }

    #[test]
    fn test_missing_transition_and_constant_hints() {
        let diff = WaveformDiff {
            signals: vec![SignalDiff {
                signal: "tb.q".to_string(),
                mismatches: vec![
                    Mismatch { time: 10, expected: "1".into(), actual: "0".into() },
                    Mismatch { time: 30, expected: "x".into(), actual: "0".into() },
                    Mismatch { time: 50, expected: "1".into(), actual: "0".into() },
                ],
                initial_mismatch: false,
            }],
        };
        let hints = mismatch_hints(&diff);
        assert!(hints.contains(&"Signal 'tb.q' missing 2 transition(s)".to_string()));
        assert!(hints.contains(&"Signal 'tb.q' is constant but should change".to_string()));
    }

    #[test]
    fn test_signals_missing_from_candidate_are_ignored() {
        let reference = parse_vcd(REFERENCE);
        let candidate = Trace::default();
        assert!(compare_traces(&reference, &candidate).is_empty());
    }

    #[test]
    fn test_inject_vcd_dump_into_initial_block() {
        let tb = "module tb;\ninitial begin\n  a = 0;\nend\nendmodule\n";
        let out = inject_vcd_dump(tb, "waveform.vcd");
        assert!(out.contains("initial begin\n    $dumpfile(\"waveform.vcd\");"));
        assert!(out.contains("a = 0;"));
    }

    #[test]
    fn test_inject_vcd_dump_after_header() {
        let tb = "module tb;\nalways #5 clk = ~clk;\nendmodule\n";
        let out = inject_vcd_dump(tb, "w.vcd");
        assert!(out.starts_with("module tb;\ninitial begin\n    $dumpfile(\"w.vcd\");"));
    }

    #[test]
    fn test_inject_vcd_dump_keeps_existing_dump() {
        let tb = "module tb;\ninitial begin $dumpfile(\"x.vcd\"); end\nendmodule\n";
        assert_eq!(inject_vcd_dump(tb, "w.vcd"), tb);
    }
}
