//! A simple CLI tool for verifying an exported ballot ledger audit trail.
//! This uses the server's own replay implementation, and is by definition
//! compatible with the output of `GET /admin/audit`.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};
use rocket::serde::json::serde_json;

use ballot_ledger::error::LedgerError;
use ballot_ledger::ledger::{tally::PartyTally, LedgerState, Policy};
use ballot_ledger::model::{
    audit::{AuditEntry, AuditLog},
    voter::DEFAULT_MINIMUM_AGE,
};

const PROGRAM_NAME: &str = "audit-verify";

const ABOUT_TEXT: &str = "Verify the integrity of a ballot ledger audit trail.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const TRAIL_PATH: &str = "TRAIL_PATH";
const MIN_AGE: &str = "min-age";
const ALLOW_REOPEN: &str = "allow-reopen";

const TRAIL_PATH_HELP: &str = "The path to a JSON dump of the audit trail,\n\
as returned by `GET /admin/audit`";

const MIN_AGE_HELP: &str = "Minimum voting age, for a trail that does not record its rules \
[default: 18]";

const ALLOW_REOPEN_HELP: &str = "Allow voting to be reopened after closing, for a trail that \
does not record its rules";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME)
        .about(ABOUT_TEXT)
        .arg(
            Arg::new(TRAIL_PATH)
                .help(TRAIL_PATH_HELP)
                .action(ArgAction::Set)
                .required(true),
        )
        .arg(
            Arg::new(MIN_AGE)
                .long(MIN_AGE)
                .help(MIN_AGE_HELP)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ALLOW_REOPEN)
                .long(ALLOW_REOPEN)
                .help(ALLOW_REOPEN_HELP)
                .action(ArgAction::SetTrue),
        )
}

/// Errors that this program may produce.
#[derive(Debug, Eq, PartialEq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Verification failed due to the contained reason.
    Verification(LedgerError),
}

/// The verified outcome of the trail.
#[derive(Debug, PartialEq)]
struct Verified {
    policy: Policy,
    entries: usize,
    head: String,
    results: Vec<PartyTally>,
    registered: u64,
    ballots: u64,
}

impl Display for Verified {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} entries, head {}", self.entries, self.head)?;
        writeln!(
            f,
            "Minimum voting age {}, reopening {}",
            self.policy.minimum_age,
            if self.policy.allow_reopen { "allowed" } else { "not allowed" }
        )?;
        for party in &self.results {
            write!(
                f,
                "{}: {} vote{}",
                party.name,
                party.vote_count,
                if party.vote_count != 1 { "s" } else { "" }
            )?;
            if !party.active {
                write!(f, " (removed)")?;
            }
            writeln!(f)?;
        }
        write!(f, "{} of {} registered voters voted", self.ballots, self.registered)
    }
}

/// Run verification. `policy` only applies if the trail records no rules of its own.
fn verify(path: &str, policy: Policy) -> Result<Verified, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let entries: Vec<AuditEntry> =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Check the hash chain first, so tampering is reported as such rather
    // than as whatever invalid command it produced.
    AuditLog::verify(&entries).map_err(Error::Verification)?;

    // Replay every command against the rules.
    let state = LedgerState::replay(policy, entries).map_err(Error::Verification)?;
    let reconciliation = state.reconcile();
    if !reconciliation.is_consistent() {
        return Err(Error::Verification(LedgerError::CorruptAuditTrail {
            sequence: state.audit().len() as u64,
            reason: format!("tally does not reconcile: {reconciliation:?}"),
        }));
    }

    let participation = state.participation();
    Ok(Verified {
        policy: state.policy(),
        entries: state.audit().len(),
        head: state.audit().head().to_string(),
        results: state.results(),
        registered: participation.registered_count,
        ballots: participation.total_votes,
    })
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(TRAIL_PATH).unwrap(); // Required argument is guaranteed to be present.
    let policy = Policy {
        minimum_age: args
            .get_one::<u32>(MIN_AGE)
            .copied()
            .unwrap_or(DEFAULT_MINIMUM_AGE),
        allow_reopen: args.get_flag(ALLOW_REOPEN),
    };
    match verify(path, policy) {
        Ok(verified) => {
            println!("Verification succeeded.");
            println!("{verified}");
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {msg}");
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {msg}");
            1
        }
        Err(Error::Verification(err)) => {
            println!("Verification failed: {err}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use chrono::{SubsecRound, Utc};

    use ballot_ledger::ledger::Command;
    use ballot_ledger::model::{
        audit::EntryHash,
        id::{ActorId, PartyId},
        party::NewParty,
        voter::{hash_national_id, NewVoter},
    };

    use super::*;

    fn voter(id: &str) -> Command {
        Command::RegisterVoter(NewVoter {
            voter_id: id.into(),
            display_name: format!("Voter {id}"),
            age: 30,
            national_id_hash: hash_national_id(id, b"secret"),
        })
    }

    fn party(name: &str) -> Command {
        Command::AddParty(NewParty {
            name: name.to_string(),
            description: String::new(),
            logo_ref: String::new(),
        })
    }

    fn cast(id: &str, party: u32) -> Command {
        Command::CastVote {
            voter_id: id.into(),
            party_id: PartyId(party),
            reference: format!("ref-{id}"),
        }
    }

    /// A valid, completed election.
    fn trail() -> Vec<AuditEntry> {
        trail_under(Policy::default())
    }

    /// The same election, recorded as run under `policy`.
    fn trail_under(policy: Policy) -> Vec<AuditEntry> {
        let admin = ActorId::from("admin");
        let commands = [
            (admin.clone(), voter("v1")),
            (admin.clone(), voter("v2")),
            (admin.clone(), party("Party A")),
            (admin.clone(), party("Party B")),
            (admin.clone(), Command::OpenVoting),
            ("v1".into(), cast("v1", 1)),
            ("v2".into(), cast("v2", 2)),
            (admin, Command::CloseVoting),
        ];
        let mut log = AuditLog::new(policy);
        for (actor, command) in commands {
            let entry = log.seal_next(actor, command, Utc::now().trunc_subsecs(3));
            log.append(entry).unwrap();
        }
        log.since(0).to_vec()
    }

    /// Write a trail to a fresh file in the temp directory.
    fn dump(name: &str, entries: &[AuditEntry]) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "{PROGRAM_NAME}-{}-{name}.json",
            std::process::id()
        ));
        std::fs::write(&path, serde_json::to_string(entries).unwrap()).unwrap();
        path
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    #[test]
    fn verification() {
        // This test actually enters ledger code, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(["ballot_ledger"], None, None);

        let valid = dump("valid", &trail());
        let verified = verify(path_str(&valid), Policy::default()).unwrap();
        assert_eq!(verified.entries, 8);
        assert_eq!(verified.registered, 2);
        assert_eq!(verified.ballots, 2);
        let tallies: Vec<_> = verified
            .results
            .iter()
            .map(|party| (party.name.as_str(), party.vote_count))
            .collect();
        assert_eq!(tallies, vec![("Party A", 1), ("Party B", 1)]);

        // A ballot moved to another party.
        let mut entries = trail();
        entries[6].payload = cast("v2", 1);
        let tampered = dump("tampered", &entries);
        assert_eq!(
            verify(path_str(&tampered), Policy::default()),
            Err(Error::Verification(LedgerError::CorruptAuditTrail {
                sequence: 7,
                reason: "hash does not match contents".to_string()
            }))
        );

        // A correctly chained trail holding a second ballot from one voter.
        let mut entries = trail();
        let last = entries.pop().unwrap();
        let extra = AuditEntry::seal(
            8,
            "v1".into(),
            Command::CastVote {
                voter_id: "v1".into(),
                party_id: PartyId(2),
                reference: "ref-again".to_string(),
            },
            last.timestamp,
            entries[6].hash,
        );
        entries.push(extra);
        let double_vote = dump("double_vote", &entries);
        assert!(matches!(
            verify(path_str(&double_vote), Policy::default()),
            Err(Error::Verification(LedgerError::CorruptAuditTrail { sequence: 8, .. }))
        ));

        // The recorded rules apply, whatever is asked for.
        let stricter = Policy {
            minimum_age: 40,
            allow_reopen: false,
        };
        let verified = verify(path_str(&valid), stricter).unwrap();
        assert_eq!(verified.policy, Policy::default());

        // A voter younger than the recorded rules allow.
        let too_young = dump("too_young", &trail_under(stricter));
        assert!(matches!(
            verify(path_str(&too_young), Policy::default()),
            Err(Error::Verification(LedgerError::CorruptAuditTrail { sequence: 1, .. }))
        ));

        // An empty trail is trivially valid.
        let empty = dump("empty", &[]);
        let verified = verify(path_str(&empty), Policy::default()).unwrap();
        assert_eq!(verified.entries, 0);
        assert_eq!(verified.head, EntryHash::GENESIS.to_string());
        assert_eq!(verified.policy, Policy::default());

        for path in [valid, tampered, double_vote, too_young, empty] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn correct_cli_usage() {
        let valid = dump("cli_valid", &trail());
        let mut entries = trail();
        entries.remove(3);
        let broken = dump("cli_broken", &entries);
        let malformed = std::env::temp_dir().join(format!(
            "{PROGRAM_NAME}-{}-cli_malformed.json",
            std::process::id()
        ));
        std::fs::write(&malformed, "{\"not\": \"a trail\"}").unwrap();

        let command_line = [PROGRAM_NAME, path_str(&valid)];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let command_line = [PROGRAM_NAME, path_str(&valid), "--min-age", "40"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 0);

        let command_line = [PROGRAM_NAME, path_str(&broken), "--allow-reopen"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 255);

        let command_line = [PROGRAM_NAME, path_str(&malformed)];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        let command_line = [PROGRAM_NAME, "not a real file"];
        let args = cli().try_get_matches_from(command_line).unwrap();
        assert_eq!(run(&args), 1);

        for path in [valid, broken, malformed] {
            std::fs::remove_file(path).unwrap();
        }
    }

    #[test]
    fn bad_cli_usage() {
        // Something very wrong.
        let command_line = [PROGRAM_NAME, "this", "invocation", "is", "incorrect"];
        cli().try_get_matches_from(command_line).unwrap_err();

        // No options at all.
        let command_line = [PROGRAM_NAME];
        cli().try_get_matches_from(command_line).unwrap_err();

        // Not a number.
        let command_line = [PROGRAM_NAME, "trail.json", "--min-age", "old"];
        cli().try_get_matches_from(command_line).unwrap_err();
    }
}
