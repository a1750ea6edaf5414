//! Ledger tables
//!
//! Idempotent DDL applied at startup. Amounts and balances are BIGINT minor
//! units.

pub const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id          BIGSERIAL PRIMARY KEY,
    owner       VARCHAR(255) NOT NULL,
    balance     BIGINT NOT NULL,
    currency    VARCHAR(16) NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_accounts_owner ON accounts (owner);

CREATE TABLE IF NOT EXISTS entries (
    id          BIGSERIAL PRIMARY KEY,
    account_id  BIGINT NOT NULL REFERENCES accounts (id),
    -- positive is credit, negative is debit
    amount      BIGINT NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_entries_account_id ON entries (account_id);

CREATE TABLE IF NOT EXISTS transfers (
    id               BIGSERIAL PRIMARY KEY,
    from_account_id  BIGINT NOT NULL REFERENCES accounts (id),
    to_account_id    BIGINT NOT NULL REFERENCES accounts (id),
    amount           BIGINT NOT NULL CHECK (amount > 0),
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS idx_transfers_from_account_id ON transfers (from_account_id);
CREATE INDEX IF NOT EXISTS idx_transfers_to_account_id ON transfers (to_account_id);
CREATE INDEX IF NOT EXISTS idx_transfers_pair ON transfers (from_account_id, to_account_id);
"#;
