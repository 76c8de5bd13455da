//! Packet-filter rule matching

use netdiag_tools::{Chain, CommandResult};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Whether a chain lets traffic to a port through
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallVerdict {
    /// Chain inspected
    pub chain: Chain,
    /// Port of interest
    pub port: u16,
    /// Whether traffic to the port is blocked
    pub has_blocking_rule: bool,
    /// Action that decided the verdict, if any blocks or an explicit rule matched
    pub rule_action: Option<String>,
    /// The explicit rule line that matched
    pub rule_line: Option<String>,
    /// Chain default policy
    pub default_policy: String,
}

fn chain_block<'a>(output: &'a str, chain: Chain) -> &'a str {
    let header = format!("Chain {} ", chain.as_str());
    let Some(start) = output.find(&header) else {
        return output;
    };
    let rest = &output[start..];
    let end = rest[header.len()..]
        .find("\nChain ")
        .map_or(rest.len(), |i| i + header.len());
    &rest[..end]
}

/// Decide whether `chain` blocks TCP/UDP traffic to `port`.
///
/// The first explicit rule for the port wins; without one the chain's
/// default policy decides, and DROP or REJECT block.
#[must_use]
pub fn parse_firewall(result: &CommandResult, chain: Chain, port: u16) -> FirewallVerdict {
    let block = chain_block(&result.stdout, chain);

    let default_policy = RegexBuilder::new(&format!(
        r"Chain {} \(policy (DROP|ACCEPT|REJECT)\b",
        chain.as_str()
    ))
    .case_insensitive(true)
    .build()
    .ok()
    .and_then(|re| re.captures(block).map(|c| c[1].to_uppercase()))
    .unwrap_or_else(|| "ACCEPT".to_string());

    let rule = Regex::new(&format!(
        r"(?i)\b(DROP|REJECT|ACCEPT)\s+(?:tcp|udp)\s+--.*?(?:tcp|udp) dpt:{port}\b"
    ))
    .ok()
    .and_then(|re| {
        block
            .lines()
            .find_map(|line| re.captures(line).map(|c| (c[1].to_uppercase(), line.trim().to_string())))
    });

    let (has_blocking_rule, rule_action, rule_line) = match rule {
        Some((action, line)) => (action != "ACCEPT", Some(action), Some(line)),
        None => {
            let blocks = default_policy != "ACCEPT";
            (blocks, blocks.then(|| default_policy.clone()), None)
        }
    };

    FirewallVerdict {
        chain,
        port,
        has_blocking_rule,
        rule_action,
        rule_line,
        default_policy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(stdout: &str, port: u16) -> FirewallVerdict {
        parse_firewall(
            &CommandResult::new("10.0.2.20", "iptables -L INPUT -n -v").with_stdout(stdout),
            Chain::Input,
            port,
        )
    }

    #[test]
    fn test_drop_policy_without_rule() {
        let verdict = parse(
            "Chain INPUT (policy DROP)\n\
             target     prot opt source               destination\n\
             ACCEPT     tcp  --  0.0.0.0/0            0.0.0.0/0            tcp dpt:22",
            80,
        );
        assert!(verdict.has_blocking_rule);
        assert_eq!(verdict.rule_action.as_deref(), Some("DROP"));
        assert_eq!(verdict.rule_line, None);
        assert_eq!(verdict.default_policy, "DROP");
    }

    #[test]
    fn test_explicit_drop_rule_under_accept_policy() {
        let verdict = parse(
            "Chain INPUT (policy ACCEPT 0 packets, 0 bytes)\n \
             pkts bytes target     prot opt in     out     source               destination\n    \
             12   720 DROP       tcp  --  *      *       0.0.0.0/0            0.0.0.0/0            tcp dpt:80",
            80,
        );
        assert!(verdict.has_blocking_rule);
        assert_eq!(verdict.rule_action.as_deref(), Some("DROP"));
        assert!(verdict.rule_line.unwrap().contains("dpt:80"));
        assert_eq!(verdict.default_policy, "ACCEPT");
    }

    #[test]
    fn test_explicit_accept_beats_drop_policy() {
        let verdict = parse(
            "Chain INPUT (policy DROP)\n\
             ACCEPT     tcp  --  0.0.0.0/0            0.0.0.0/0            tcp dpt:443",
            443,
        );
        assert!(!verdict.has_blocking_rule);
        assert_eq!(verdict.rule_action.as_deref(), Some("ACCEPT"));
    }

    #[test]
    fn test_port_match_is_word_bounded() {
        let verdict = parse(
            "Chain INPUT (policy ACCEPT)\n\
             DROP       tcp  --  0.0.0.0/0            0.0.0.0/0            tcp dpt:8080",
            80,
        );
        assert!(!verdict.has_blocking_rule);
        assert_eq!(verdict.rule_action, None);
    }

    #[test]
    fn test_rules_of_other_chains_are_ignored() {
        let verdict = parse(
            "Chain INPUT (policy ACCEPT)\n\
             target     prot opt source               destination\n\n\
             Chain FORWARD (policy DROP)\n\
             DROP       tcp  --  0.0.0.0/0            0.0.0.0/0            tcp dpt:80",
            80,
        );
        assert!(!verdict.has_blocking_rule);
    }

    #[test]
    fn test_reject_policy_blocks() {
        let verdict = parse("Chain INPUT (policy REJECT)", 80);
        assert!(verdict.has_blocking_rule);
        assert_eq!(verdict.rule_action.as_deref(), Some("REJECT"));
    }

    #[test]
    fn test_empty_output_defaults_to_accept() {
        let verdict = parse("", 80);
        assert!(!verdict.has_blocking_rule);
        assert_eq!(verdict.default_policy, "ACCEPT");
    }
}
