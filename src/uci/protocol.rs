use crate::board::position::{Move, Position};
use crate::book::PolyglotBook;
use crate::eval::params;
use crate::movegen::moves::{move_to_uci, parse_uci_move, perft};
use crate::search::alphabeta::Searcher;
use crate::search::time_management::GoLimits;
use crate::syzygy::Tablebases;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const ENGINE_NAME: &str = "Ferrite";
const ENGINE_VERSION: &str = "0.9";
const ENGINE_AUTHOR: &str = "Ferrite developers";

const DEFAULT_HASH_MB: usize = 64;

pub struct UciEngine {
    position: Position,
    searcher: Arc<Mutex<Searcher>>,
    stop_flag: Arc<AtomicBool>,
    search_thread: Option<thread::JoinHandle<()>>,
    hash_mb: usize,
    threads: usize,
    multipv: usize,
    move_overhead: i64,
    debug: bool,
}

impl UciEngine {
    pub fn new() -> UciEngine {
        crate::movegen::magic::init();
        let searcher = Searcher::new(DEFAULT_HASH_MB);
        let stop_flag = Arc::clone(&searcher.stop);
        UciEngine {
            position: Position::startpos(),
            searcher: Arc::new(Mutex::new(searcher)),
            stop_flag,
            search_thread: None,
            hash_mb: DEFAULT_HASH_MB,
            threads: 1,
            multipv: 1,
            move_overhead: 30,
            debug: false,
        }
    }

    pub fn run(&mut self) {
        println!("{ENGINE_NAME} {ENGINE_VERSION} by {ENGINE_AUTHOR}");
        io::stdout().flush().ok();

        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if !self.handle(line) {
                break;
            }
            io::stdout().flush().ok();
        }
        self.ensure_stopped();
    }

    /// Returns false on `quit`.
    pub fn handle(&mut self, line: &str) -> bool {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[0] {
            "uci" => self.cmd_uci(),
            "debug" => self.debug = parts.get(1) == Some(&"on"),
            "isready" => {
                self.ensure_stopped();
                println!("readyok");
            }
            "setoption" => self.cmd_setoption(&parts),
            "ucinewgame" => self.cmd_newgame(),
            "position" => self.cmd_position(&parts),
            "go" => self.cmd_go(&parts),
            "stop" => {
                self.stop_flag.store(true, Ordering::SeqCst);
                self.ensure_stopped();
            }
            "quit" => {
                self.ensure_stopped();
                return false;
            }
            "d" | "display" => {
                print!("{}", self.position.board_string());
                println!("fen: {}", self.position.to_fen());
                println!("key: {:016x}", self.position.key);
            }
            "perft" => {
                let depth = parts.get(1).and_then(|d| d.parse().ok()).unwrap_or(5);
                let start = std::time::Instant::now();
                let nodes = perft(&mut self.position, depth);
                let ms = start.elapsed().as_millis().max(1);
                println!(
                    "perft {} nodes {} time {} nps {}",
                    depth,
                    nodes,
                    ms,
                    nodes as u128 * 1000 / ms
                );
            }
            _ => self.debug_msg(&format!("unknown command: {}", parts[0])),
        }
        true
    }

    fn cmd_uci(&self) {
        println!("id name {ENGINE_NAME} {ENGINE_VERSION}");
        println!("id author {ENGINE_AUTHOR}");
        println!("option name Hash type spin default {DEFAULT_HASH_MB} min 1 max 2048");
        println!("option name Threads type spin default 1 min 1 max 64");
        println!("option name MoveOverhead type spin default 30 min 0 max 500");
        println!("option name MultiPV type spin default 1 min 1 max 10");
        println!("option name UseSyzygy type check default false");
        println!("option name SyzygyPath type string default <empty>");
        println!("option name OwnBook type check default false");
        println!("option name BookFile type string default <empty>");
        println!("option name BookRandom type check default false");
        println!("option name BookMinWeight type spin default 0 min 0 max 65535");
        println!("option name BookMaxPly type spin default 20 min 0 max 200");
        println!("option name ParamFile type string default <empty>");
        println!("option name Clear Hash type button");
        println!("uciok");
    }

    fn cmd_setoption(&mut self, parts: &[&str]) {
        self.ensure_stopped();

        let mut name = Vec::new();
        let mut value = Vec::new();
        let mut target: Option<&mut Vec<&str>> = None;
        for &part in &parts[1..] {
            match part {
                "name" => target = Some(&mut name),
                "value" => target = Some(&mut value),
                _ => {
                    if let Some(t) = target.as_mut() {
                        t.push(part);
                    }
                }
            }
        }
        let name = name.join(" ");
        let value = value.join(" ");

        let mut searcher = self.searcher.lock().unwrap();
        match name.as_str() {
            "Hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    self.hash_mb = mb.clamp(1, 2048);
                    searcher.resize_hash(self.hash_mb);
                }
            }
            "Threads" => {
                if let Ok(n) = value.parse::<usize>() {
                    self.threads = n.clamp(1, 64);
                    searcher.threads = self.threads;
                }
            }
            "MoveOverhead" => {
                if let Ok(ms) = value.parse::<i64>() {
                    self.move_overhead = ms.clamp(0, 500);
                    searcher.move_overhead_ms = self.move_overhead;
                }
            }
            "MultiPV" => {
                if let Ok(n) = value.parse::<usize>() {
                    self.multipv = n.clamp(1, 10);
                    searcher.multipv = self.multipv;
                }
            }
            "UseSyzygy" => searcher.use_syzygy = value.eq_ignore_ascii_case("true"),
            "SyzygyPath" => {
                if !value.is_empty() && value != "<empty>" {
                    searcher.tablebases = Tablebases::init(&value);
                    let n = searcher.tablebases.largest();
                    drop(searcher);
                    self.debug_msg(&format!("syzygy path set, largest {n}"));
                    return;
                }
            }
            "OwnBook" => searcher.use_book = value.eq_ignore_ascii_case("true"),
            "BookFile" => {
                if !value.is_empty() && value != "<empty>" {
                    match PolyglotBook::load(&value) {
                        Ok(book) => {
                            println!(
                                "info string book loaded {} entries {}",
                                book.file_name(),
                                book.entry_count()
                            );
                            searcher.book = Some(book);
                        }
                        Err(e) => println!("info string book failed to load: {e:#}"),
                    }
                }
            }
            "BookRandom" => searcher.book_random = value.eq_ignore_ascii_case("true"),
            "BookMinWeight" => {
                if let Ok(w) = value.parse::<u16>() {
                    searcher.book_min_weight = w;
                }
            }
            "BookMaxPly" => {
                if let Ok(p) = value.parse::<u32>() {
                    searcher.book_max_ply = p.min(200);
                }
            }
            "ParamFile" => {
                if !value.is_empty() && value != "<empty>" {
                    match params::load_file(&value) {
                        Ok(n) => println!("info string loaded {n} parameters"),
                        Err(e) => println!("info string parameter file failed: {e:#}"),
                    }
                }
            }
            "Clear Hash" => searcher.clear(),
            _ => {
                drop(searcher);
                self.debug_msg(&format!("unknown option: {name}"));
            }
        }
    }

    fn cmd_newgame(&mut self) {
        self.ensure_stopped();
        self.position = Position::startpos();
        self.searcher.lock().unwrap().clear();
    }

    fn cmd_position(&mut self, parts: &[&str]) {
        self.ensure_stopped();
        if parts.len() < 2 {
            return;
        }

        let mut moves_at = None;
        let mut pos = match parts[1] {
            "startpos" => {
                moves_at = parts.iter().position(|&p| p == "moves").map(|i| i + 1);
                Position::startpos()
            }
            "fen" => {
                let end = parts.iter().position(|&p| p == "moves").unwrap_or(parts.len());
                moves_at = if end < parts.len() { Some(end + 1) } else { None };
                let fen = parts[2..end].join(" ");
                match Position::from_fen(&fen) {
                    Some(p) => p,
                    None => {
                        // Never install a malformed position.
                        self.debug_msg(&format!("invalid fen: {fen}"));
                        return;
                    }
                }
            }
            _ => {
                self.debug_msg("invalid position command");
                return;
            }
        };

        if let Some(start) = moves_at {
            for &text in &parts[start..] {
                match parse_uci_move(&mut pos, text) {
                    Some(m) => {
                        pos.make(m);
                        pos.game_keys.push(pos.key);
                    }
                    None => {
                        self.debug_msg(&format!("illegal move ignored: {text}"));
                        break;
                    }
                }
            }
        }

        self.position = pos;
    }

    fn cmd_go(&mut self, parts: &[&str]) {
        self.ensure_stopped();

        let mut lim = GoLimits::default();
        let mut i = 1;
        while i < parts.len() {
            let arg = |i: usize| parts.get(i + 1).and_then(|v| v.parse::<i64>().ok());
            match parts[i] {
                "wtime" => {
                    lim.wtime_ms = arg(i).unwrap_or(0);
                    i += 1;
                }
                "btime" => {
                    lim.btime_ms = arg(i).unwrap_or(0);
                    i += 1;
                }
                "winc" => {
                    lim.winc_ms = arg(i).unwrap_or(0);
                    i += 1;
                }
                "binc" => {
                    lim.binc_ms = arg(i).unwrap_or(0);
                    i += 1;
                }
                "movestogo" => {
                    lim.movestogo = arg(i).unwrap_or(0) as i32;
                    i += 1;
                }
                "depth" => {
                    lim.depth = arg(i).unwrap_or(0) as i32;
                    i += 1;
                }
                "movetime" => {
                    lim.movetime_ms = arg(i).unwrap_or(0);
                    i += 1;
                }
                "infinite" => lim.infinite = true,
                _ => {}
            }
            i += 1;
        }

        let searcher = Arc::clone(&self.searcher);
        let mut pos = self.position.clone();
        self.stop_flag.store(false, Ordering::SeqCst);

        self.search_thread = Some(thread::spawn(move || {
            let report = searcher.lock().unwrap().go(&mut pos, &lim);
            if report.best_move == Move::NONE {
                println!("bestmove 0000");
            } else if report.pv.len() > 1 {
                println!(
                    "bestmove {} ponder {}",
                    move_to_uci(report.best_move),
                    move_to_uci(report.pv[1])
                );
            } else {
                println!("bestmove {}", move_to_uci(report.best_move));
            }
            io::stdout().flush().ok();
        }));
    }

    fn ensure_stopped(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            self.stop_flag.store(true, Ordering::SeqCst);
            handle.join().ok();
            self.stop_flag.store(false, Ordering::SeqCst);
        }
    }

    fn debug_msg(&self, msg: &str) {
        if self.debug {
            println!("info string {msg}");
        }
    }
}

impl Default for UciEngine {
    fn default() -> Self {
        UciEngine::new()
    }
}

pub fn run() {
    let mut engine = UciEngine::new();
    engine.run();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_command_applies_moves() {
        let mut engine = UciEngine::new();
        engine.handle("position startpos moves e2e4 e7e5 g1f3");
        assert_eq!(
            engine.position.to_fen(),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R b KQkq - 1 2"
        );
        // Root plus three positions in the history.
        assert_eq!(engine.position.game_keys.len(), 4);
    }

    #[test]
    fn malformed_fen_keeps_old_position() {
        let mut engine = UciEngine::new();
        engine.handle("position startpos moves e2e4");
        let before = engine.position.to_fen();
        engine.handle("position fen not a real fen at all");
        assert_eq!(engine.position.to_fen(), before);
    }

    #[test]
    fn illegal_move_stops_application() {
        let mut engine = UciEngine::new();
        engine.handle("position startpos moves e2e4 e2e4 d2d4");
        // Only the first move applied.
        assert_eq!(
            engine.position.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1"
        );
    }

    #[test]
    fn setoption_adjusts_searcher() {
        let mut engine = UciEngine::new();
        engine.handle("setoption name Threads value 4");
        engine.handle("setoption name MultiPV value 3");
        engine.handle("setoption name MoveOverhead value 100");
        let s = engine.searcher.lock().unwrap();
        assert_eq!(s.threads, 4);
        assert_eq!(s.multipv, 3);
        assert_eq!(s.move_overhead_ms, 100);
    }

    #[test]
    fn quit_returns_false() {
        let mut engine = UciEngine::new();
        assert!(engine.handle("isready"));
        assert!(!engine.handle("quit"));
    }
}
