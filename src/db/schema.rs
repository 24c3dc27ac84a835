//! Ledger schema DDL
//!
//! Applied in order by [`Database::migrate`](super::Database::migrate).

/// UNIQUE constraint that decides idempotency races
pub const IDEMPOTENCY_KEY_CONSTRAINT: &str = "uq_transactions_idempotency_key";

pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "accounts",
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id UUID PRIMARY KEY,
            account_number VARCHAR(34) NOT NULL,
            account_kind VARCHAR(16) NOT NULL,
            currency CHAR(3) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'active',
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT uq_accounts_account_number UNIQUE (account_number),
            CONSTRAINT ck_accounts_kind
                CHECK (account_kind IN ('checking', 'savings', 'loan', 'equity')),
            CONSTRAINT ck_accounts_status
                CHECK (status IN ('active', 'frozen', 'closed'))
        )
        "#,
    ),
    (
        "transactions",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id UUID PRIMARY KEY,
            idempotency_key VARCHAR(255) NOT NULL,
            kind VARCHAR(16) NOT NULL DEFAULT 'transfer',
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            amount NUMERIC(20, 4) NOT NULL,
            currency CHAR(3) NOT NULL,
            source_account_id UUID NOT NULL REFERENCES accounts (id),
            destination_account_id UUID NOT NULL REFERENCES accounts (id),
            reference TEXT,
            initiated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            processed_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT,
            CONSTRAINT uq_transactions_idempotency_key UNIQUE (idempotency_key),
            CONSTRAINT ck_transactions_amount_positive CHECK (amount > 0),
            CONSTRAINT ck_transactions_status
                CHECK (status IN ('pending', 'processing', 'completed', 'failed'))
        )
        "#,
    ),
    (
        "idx_transactions_pending",
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_pending
            ON transactions (initiated_at)
            WHERE status = 'pending'
        "#,
    ),
    (
        "transaction_parties",
        r#"
        CREATE TABLE IF NOT EXISTS transaction_parties (
            id UUID PRIMARY KEY,
            transaction_id UUID NOT NULL REFERENCES transactions (id),
            account_id UUID NOT NULL REFERENCES accounts (id),
            role VARCHAR(16) NOT NULL,
            CONSTRAINT uq_transaction_parties_role UNIQUE (transaction_id, role),
            CONSTRAINT ck_transaction_parties_role CHECK (role IN ('source', 'destination'))
        )
        "#,
    ),
    (
        "ledger_entries",
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id UUID PRIMARY KEY,
            transaction_id UUID NOT NULL REFERENCES transactions (id),
            account_id UUID NOT NULL REFERENCES accounts (id),
            amount NUMERIC(20, 4) NOT NULL,
            entry_kind VARCHAR(8) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            CONSTRAINT ck_ledger_entries_nonzero CHECK (amount <> 0),
            CONSTRAINT ck_ledger_entries_kind_sign CHECK (
                (entry_kind = 'debit' AND amount < 0) OR (entry_kind = 'credit' AND amount > 0)
            )
        )
        "#,
    ),
    (
        "idx_ledger_entries_account",
        r#"
        CREATE INDEX IF NOT EXISTS idx_ledger_entries_account
            ON ledger_entries (account_id, created_at)
        "#,
    ),
    (
        "idx_ledger_entries_transaction",
        r#"
        CREATE INDEX IF NOT EXISTS idx_ledger_entries_transaction
            ON ledger_entries (transaction_id)
        "#,
    ),
    (
        "ledger_entries_append_only_fn",
        r#"
        CREATE OR REPLACE FUNCTION ledger_entries_append_only() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'ledger_entries is append-only';
        END;
        $$ LANGUAGE plpgsql
        "#,
    ),
    (
        "ledger_entries_append_only_trigger",
        r#"
        CREATE OR REPLACE TRIGGER trg_ledger_entries_append_only
            BEFORE UPDATE OR DELETE ON ledger_entries
            FOR EACH ROW EXECUTE FUNCTION ledger_entries_append_only()
        "#,
    ),
    (
        "dispatch_queue",
        r#"
        CREATE TABLE IF NOT EXISTS dispatch_queue (
            id BIGSERIAL PRIMARY KEY,
            transaction_id UUID NOT NULL,
            kind VARCHAR(16) NOT NULL,
            published_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            visible_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            attempts INTEGER NOT NULL DEFAULT 0
        )
        "#,
    ),
    (
        "idx_dispatch_queue_visible",
        r#"
        CREATE INDEX IF NOT EXISTS idx_dispatch_queue_visible
            ON dispatch_queue (visible_at, id)
        "#,
    ),
    (
        "idx_dispatch_queue_transaction",
        r#"
        CREATE INDEX IF NOT EXISTS idx_dispatch_queue_transaction
            ON dispatch_queue (transaction_id)
        "#,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names_present() {
        let all: String = MIGRATIONS.iter().map(|(_, sql)| *sql).collect();
        assert!(all.contains(IDEMPOTENCY_KEY_CONSTRAINT));
        assert!(all.contains("ck_ledger_entries_nonzero"));
    }

    #[test]
    fn test_step_names_unique() {
        let mut names: Vec<&str> = MIGRATIONS.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), MIGRATIONS.len());
    }
}
