use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use std::sync::RwLock;

/// Runtime-tunable search and evaluation parameters, so tuning runs can
/// adjust them without a rebuild. Loaded from a `key=value` text file.
#[derive(Debug, Clone)]
pub struct Params {
    // Aspiration window half-width: base + depth * per_depth (centipawns).
    pub asp_base: i32,
    pub asp_per_depth: i32,

    // History pruning (quiet moves only).
    pub hist_prune_min_depth: i32,
    pub hist_prune_late_base: i32,
    pub hist_prune_late_per_depth: i32,
    pub hist_prune_threshold: i32,

    // Late move reduction adjustments.
    pub lmr_check_bonus: i32,
    pub lmr_goodhist_bonus: i32,
    pub lmr_badhist_penalty: i32,

    // King safety attack units.
    pub ks_attacker_bonus: i32,
    pub ks_units_n: i32,
    pub ks_units_b: i32,
    pub ks_units_r: i32,
    pub ks_units_q: i32,
    pub ks_scale: i32,

    // Threat bonuses.
    pub thr_hanging_minor: i32,
    pub thr_hanging_rook: i32,
    pub thr_hanging_queen: i32,
    pub thr_pawn_attack_bonus: i32,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            asp_base: 18,
            asp_per_depth: 10,
            hist_prune_min_depth: 8,
            hist_prune_late_base: 12,
            hist_prune_late_per_depth: 2,
            hist_prune_threshold: -2000,
            lmr_check_bonus: 1,
            lmr_goodhist_bonus: 1,
            lmr_badhist_penalty: 1,
            ks_attacker_bonus: 6,
            ks_units_n: 6,
            ks_units_b: 6,
            ks_units_r: 4,
            ks_units_q: 10,
            ks_scale: 1,
            thr_hanging_minor: 18,
            thr_hanging_rook: 28,
            thr_hanging_queen: 40,
            thr_pawn_attack_bonus: 8,
        }
    }
}

impl Params {
    fn set(&mut self, key: &str, value: i32) -> bool {
        match key {
            "asp_base" => self.asp_base = value,
            "asp_per_depth" => self.asp_per_depth = value,
            "hist_prune_min_depth" => self.hist_prune_min_depth = value,
            "hist_prune_late_base" => self.hist_prune_late_base = value,
            "hist_prune_late_per_depth" => self.hist_prune_late_per_depth = value,
            "hist_prune_threshold" => self.hist_prune_threshold = value,
            "lmr_check_bonus" => self.lmr_check_bonus = value,
            "lmr_goodhist_bonus" => self.lmr_goodhist_bonus = value,
            "lmr_badhist_penalty" => self.lmr_badhist_penalty = value,
            "ks_attacker_bonus" => self.ks_attacker_bonus = value,
            "ks_units_n" => self.ks_units_n = value,
            "ks_units_b" => self.ks_units_b = value,
            "ks_units_r" => self.ks_units_r = value,
            "ks_units_q" => self.ks_units_q = value,
            "ks_scale" => self.ks_scale = value,
            "thr_hanging_minor" => self.thr_hanging_minor = value,
            "thr_hanging_rook" => self.thr_hanging_rook = value,
            "thr_hanging_queen" => self.thr_hanging_queen = value,
            "thr_pawn_attack_bonus" => self.thr_pawn_attack_bonus = value,
            _ => return false,
        }
        true
    }
}

static PARAMS: Lazy<RwLock<Params>> = Lazy::new(|| RwLock::new(Params::default()));

pub fn get() -> Params {
    PARAMS.read().unwrap().clone()
}

pub fn reset() {
    *PARAMS.write().unwrap() = Params::default();
}

/// Parse `key=value` lines; blank lines and `#` comments are skipped and
/// unknown keys are ignored. Returns how many keys were applied.
pub fn load_file(path: &str) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read parameter file {path}"))?;
    let mut applied = 0;
    let mut params = PARAMS.write().unwrap();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let Ok(value) = value.trim().parse::<i32>() else {
            continue;
        };
        if params.set(key.trim(), value) {
            applied += 1;
        }
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_tuned_baseline() {
        let p = Params::default();
        assert_eq!(p.asp_base, 18);
        assert_eq!(p.hist_prune_threshold, -2000);
        assert_eq!(p.ks_units_q, 10);
    }

    #[test]
    fn file_loading_applies_known_keys() {
        let mut file = tempfile_path();
        writeln!(file.1, "# comment").unwrap();
        writeln!(file.1, "asp_base = 25").unwrap();
        writeln!(file.1, "no_such_key = 1").unwrap();
        writeln!(file.1, "ks_units_r=7").unwrap();
        writeln!(file.1, "garbage line").unwrap();
        drop(file.1);

        let applied = load_file(&file.0).unwrap();
        assert_eq!(applied, 2);
        let p = get();
        assert_eq!(p.asp_base, 25);
        assert_eq!(p.ks_units_r, 7);
        reset();
        std::fs::remove_file(&file.0).ok();
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_file("/definitely/not/here.txt").is_err());
    }

    fn tempfile_path() -> (String, std::fs::File) {
        let path = std::env::temp_dir().join(format!(
            "ferrite-params-{}.txt",
            std::process::id()
        ));
        let file = std::fs::File::create(&path).unwrap();
        (path.to_string_lossy().into_owned(), file)
    }
}
