//! GraphQL documents sent to the Mina daemon.
//!
//! Block fields live in one selection so the mapper and the fixtures agree
//! on a single shape.

/// Fields requested for every block.
pub const BLOCK_FIELDS: &str = r#"
    stateHash
    creator
    creatorAccount {
        publicKey
        delegate
        nonce
        balance { blockHeight total unknown }
    }
    protocolState {
        previousStateHash
        blockchainState {
            date
            utcDate
            stagedLedgerHash
            snarkedLedgerHash
        }
        consensusState {
            blockHeight
            blockchainLength
            epoch
            slot
            totalCurrency
            stakingEpochData { ledger { hash } }
        }
    }
    snarkJobs { fee prover workIds }
    transactions {
        coinbase
        feeTransfer { recipient fee }
        userCommands {
            id
            isDelegation
            from
            to
            amount
            fee
            nonce
            memo
            failureReason
            fromAccount {
                publicKey
                delegate
                nonce
                balance { blockHeight total unknown }
            }
            toAccount {
                publicKey
                delegate
                nonce
                balance { blockHeight total unknown }
            }
        }
    }
"#;

pub const DAEMON_STATUS: &str = r#"
    query {
        daemonStatus {
            syncStatus
            uptimeSecs
            stateHash
            commitId
            peers
            highestBlockLengthReceived
            blockchainLength
            numAccounts
        }
    }
"#;

/// The last `max_length` blocks of the node's best chain, oldest first.
pub fn best_chain(max_length: u32) -> String {
    format!("query {{ bestChain(maxLength: {max_length}) {{ {BLOCK_FIELDS} }} }}")
}

pub fn account(public_key: &str) -> String {
    format!(
        r#"query {{
        account(publicKey: "{public_key}") {{
            publicKey
            nonce
            inferredNonce
            receiptChainHash
            delegate
            votingFor
            locked
            balance {{ blockHeight total unknown }}
        }}
    }}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_chain_embeds_block_fields() {
        let q = best_chain(290);
        assert!(q.contains("bestChain(maxLength: 290)"));
        assert!(q.contains("previousStateHash"));
        assert!(q.contains("userCommands"));
    }

    #[test]
    fn account_quotes_public_key() {
        assert!(account("B62qabc").contains(r#"account(publicKey: "B62qabc")"#));
    }
}
