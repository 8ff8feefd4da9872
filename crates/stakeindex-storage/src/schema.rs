//! Table declarations for the PostgreSQL backend.
//!
//! The layout is declared here once, independent of the in-memory model
//! types. Amounts are `NUMERIC` holding the decimal value (9 fractional
//! digits); percentages are `NUMERIC` fractions.

/// One table with its indexes.
pub struct Table {
    pub name: &'static str,
    pub ddl: &'static str,
    pub indexes: &'static [&'static str],
}

pub const BLOCKS: Table = Table {
    name: "blocks",
    ddl: "CREATE TABLE IF NOT EXISTS blocks (
        hash                 TEXT        PRIMARY KEY,
        height               BIGINT      NOT NULL,
        parent_hash          TEXT        NOT NULL,
        time                 TIMESTAMPTZ NOT NULL,
        creator              TEXT        NOT NULL,
        coinbase             NUMERIC     NOT NULL,
        total_currency       NUMERIC     NOT NULL,
        epoch                BIGINT      NOT NULL,
        slot                 BIGINT      NOT NULL,
        ledger_hash          TEXT        NOT NULL,
        staged_ledger_hash   TEXT        NOT NULL,
        snarked_ledger_hash  TEXT        NOT NULL,
        transactions_count   INTEGER     NOT NULL,
        transactions_fees    NUMERIC     NOT NULL,
        snark_jobs_count     INTEGER     NOT NULL,
        snark_jobs_fees      NUMERIC     NOT NULL,
        canonicity           TEXT        NOT NULL DEFAULT 'pending',
        created_at           TIMESTAMPTZ NOT NULL,
        updated_at           TIMESTAMPTZ NOT NULL
    )",
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_blocks_height ON blocks (height)",
        "CREATE INDEX IF NOT EXISTS idx_blocks_creator ON blocks (creator)",
        "CREATE INDEX IF NOT EXISTS idx_blocks_time ON blocks (time)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_blocks_canonical_height
            ON blocks (height) WHERE canonicity = 'canonical'",
    ],
};

pub const ACCOUNTS: Table = Table {
    name: "accounts",
    ddl: "CREATE TABLE IF NOT EXISTS accounts (
        public_key       TEXT        PRIMARY KEY,
        delegate         TEXT,
        balance          NUMERIC     NOT NULL,
        balance_unknown  NUMERIC     NOT NULL,
        nonce            BIGINT      NOT NULL,
        stake_weight     NUMERIC,
        start_height     BIGINT      NOT NULL,
        start_time       TIMESTAMPTZ NOT NULL,
        last_height      BIGINT      NOT NULL,
        last_time        TIMESTAMPTZ NOT NULL,
        created_at       TIMESTAMPTZ NOT NULL,
        updated_at       TIMESTAMPTZ NOT NULL
    )",
    indexes: &["CREATE INDEX IF NOT EXISTS idx_accounts_delegate ON accounts (delegate)"],
};

pub const VALIDATORS: Table = Table {
    name: "validators",
    ddl: "CREATE TABLE IF NOT EXISTS validators (
        public_key         TEXT        PRIMARY KEY,
        blocks_produced    BIGINT      NOT NULL DEFAULT 0,
        stake              NUMERIC     NOT NULL DEFAULT 0,
        delegations_count  BIGINT      NOT NULL DEFAULT 0,
        fee                NUMERIC     NOT NULL,
        start_height       BIGINT      NOT NULL,
        start_time         TIMESTAMPTZ NOT NULL,
        last_height        BIGINT      NOT NULL,
        last_time          TIMESTAMPTZ NOT NULL,
        created_at         TIMESTAMPTZ NOT NULL,
        updated_at         TIMESTAMPTZ NOT NULL
    )",
    indexes: &[],
};

pub const TRANSACTIONS: Table = Table {
    name: "transactions",
    ddl: "CREATE TABLE IF NOT EXISTS transactions (
        hash                       TEXT        NOT NULL,
        block_hash                 TEXT        NOT NULL,
        tx_type                    TEXT        NOT NULL,
        height                     BIGINT      NOT NULL,
        time                       TIMESTAMPTZ NOT NULL,
        sender                     TEXT        NOT NULL,
        receiver                   TEXT        NOT NULL,
        amount                     NUMERIC     NOT NULL,
        fee                        NUMERIC     NOT NULL,
        nonce                      BIGINT      NOT NULL,
        memo                       TEXT        NOT NULL DEFAULT '',
        status                     TEXT        NOT NULL,
        canonicity                 TEXT        NOT NULL DEFAULT 'pending',
        failure_reason             TEXT,
        sequence_number            INTEGER,
        secondary_sequence_number  INTEGER,
        created_at                 TIMESTAMPTZ NOT NULL,
        updated_at                 TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (hash, block_hash)
    )",
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_transactions_block_hash ON transactions (block_hash)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_height ON transactions (height)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_sender ON transactions (sender)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_receiver ON transactions (receiver)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions (hash)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_time ON transactions (time)",
    ],
};

pub const JOBS: Table = Table {
    name: "jobs",
    ddl: "CREATE TABLE IF NOT EXISTS jobs (
        block_hash   TEXT        NOT NULL,
        position     INTEGER     NOT NULL,
        height       BIGINT      NOT NULL,
        time         TIMESTAMPTZ NOT NULL,
        prover       TEXT        NOT NULL,
        fee          NUMERIC     NOT NULL,
        works_count  INTEGER     NOT NULL,
        created_at   TIMESTAMPTZ NOT NULL,
        updated_at   TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (block_hash, position)
    )",
    indexes: &["CREATE INDEX IF NOT EXISTS idx_jobs_height ON jobs (height)"],
};

pub const SNARKERS: Table = Table {
    name: "snarkers",
    ddl: "CREATE TABLE IF NOT EXISTS snarkers (
        public_key    TEXT        PRIMARY KEY,
        fee           NUMERIC     NOT NULL,
        jobs_count    BIGINT      NOT NULL DEFAULT 0,
        works_count   BIGINT      NOT NULL DEFAULT 0,
        fees          NUMERIC     NOT NULL DEFAULT 0,
        start_height  BIGINT      NOT NULL,
        start_time    TIMESTAMPTZ NOT NULL,
        last_height   BIGINT      NOT NULL,
        last_time     TIMESTAMPTZ NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )",
    indexes: &[],
};

pub const FEE_TRANSFERS: Table = Table {
    name: "fee_transfers",
    ddl: "CREATE TABLE IF NOT EXISTS fee_transfers (
        block_hash  TEXT        NOT NULL,
        position    INTEGER     NOT NULL,
        height      BIGINT      NOT NULL,
        time        TIMESTAMPTZ NOT NULL,
        recipient   TEXT        NOT NULL,
        fee         NUMERIC     NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (block_hash, position)
    )",
    indexes: &["CREATE INDEX IF NOT EXISTS idx_fee_transfers_recipient ON fee_transfers (recipient)"],
};

pub const STATS_CHAIN: Table = Table {
    name: "stats_chain",
    ddl: "CREATE TABLE IF NOT EXISTS stats_chain (
        bucket               TEXT        NOT NULL,
        time                 TIMESTAMPTZ NOT NULL,
        blocks_count         BIGINT      NOT NULL,
        transactions_count   BIGINT      NOT NULL,
        payments_count       BIGINT      NOT NULL,
        delegations_count    BIGINT      NOT NULL,
        transactions_volume  NUMERIC     NOT NULL,
        transactions_fees    NUMERIC     NOT NULL,
        jobs_count           BIGINT      NOT NULL,
        jobs_fees            NUMERIC     NOT NULL,
        validators_count     BIGINT      NOT NULL,
        created_at           TIMESTAMPTZ NOT NULL,
        updated_at           TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (bucket, time)
    )",
    indexes: &[],
};

pub const STATS_VALIDATOR: Table = Table {
    name: "stats_validator",
    ddl: "CREATE TABLE IF NOT EXISTS stats_validator (
        public_key             TEXT        NOT NULL,
        bucket                 TEXT        NOT NULL,
        time                   TIMESTAMPTZ NOT NULL,
        blocks_produced_count  BIGINT      NOT NULL,
        delegations_count      BIGINT      NOT NULL,
        delegated_balance      NUMERIC     NOT NULL,
        created_at             TIMESTAMPTZ NOT NULL,
        updated_at             TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (public_key, bucket, time)
    )",
    indexes: &["CREATE INDEX IF NOT EXISTS idx_stats_validator_bucket_time ON stats_validator (bucket, time)"],
};

pub const REWARDS: Table = Table {
    name: "rewards",
    ddl: "CREATE TABLE IF NOT EXISTS rewards (
        block_hash     TEXT        NOT NULL,
        owner_account  TEXT        NOT NULL,
        owner_type     TEXT        NOT NULL,
        height         BIGINT      NOT NULL,
        time           TIMESTAMPTZ NOT NULL,
        validator      TEXT        NOT NULL,
        amount         NUMERIC     NOT NULL,
        created_at     TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (block_hash, owner_account, owner_type)
    )",
    indexes: &[
        "CREATE INDEX IF NOT EXISTS idx_rewards_owner_time ON rewards (owner_account, owner_type, time)",
        "CREATE INDEX IF NOT EXISTS idx_rewards_time ON rewards (time)",
    ],
};

pub const CHECKPOINTS: Table = Table {
    name: "checkpoints",
    ddl: "CREATE TABLE IF NOT EXISTS checkpoints (
        indexer_id  TEXT    PRIMARY KEY,
        height      BIGINT  NOT NULL,
        block_hash  TEXT    NOT NULL,
        updated_at  BIGINT  NOT NULL DEFAULT EXTRACT(EPOCH FROM NOW())::BIGINT
    )",
    indexes: &[],
};

/// Every table, in creation order.
pub const TABLES: &[Table] = &[
    BLOCKS,
    ACCOUNTS,
    VALIDATORS,
    TRANSACTIONS,
    JOBS,
    SNARKERS,
    FEE_TRANSFERS,
    STATS_CHAIN,
    STATS_VALIDATOR,
    REWARDS,
    CHECKPOINTS,
];
