use std::collections::HashMap;

use rusqlite::params;

use wh_domain::config::Policy;
use wh_domain::Result;

use crate::Store;

impl Store {
    /// The durable global tool policy table (`always`-scoped decisions and
    /// bulk mode switches land here).
    pub fn get_tool_policies(&self) -> Result<HashMap<String, Policy>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT tool_name, policy FROM tool_policies")?;
            let rows = stmt
                .query_map([], |row| {
                    let name: String = row.get(0)?;
                    let policy: String = row.get(1)?;
                    Ok((name, policy))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows
                .into_iter()
                .filter_map(|(name, p)| Policy::parse(&p).map(|p| (name, p)))
                .collect())
        })
    }

    pub fn upsert_tool_policy(&self, tool_name: &str, policy: Policy) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tool_policies (tool_name, policy) VALUES (?1, ?2) \
                 ON CONFLICT(tool_name) DO UPDATE SET policy = excluded.policy",
                params![tool_name, policy.as_str()],
            )
            .map(|_| ())
        })
    }

    pub fn clear_tool_policies(&self) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM tool_policies", []).map(|_| ()))
    }
}
