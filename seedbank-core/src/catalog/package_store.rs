use crate::error::{Result, SeedbankError};
use crate::model::{
    Creator, DataPackage, DataPackageFile, Doi, IdentifierScheme, IdentifierType, License,
    RelatedIdentifier, RelationType, Tag, UpdateMode,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::path::PathBuf;

/// Filters for paged package listing. The default excludes soft-deleted
/// packages; `deleted = true` lists only archived ones.
#[derive(Debug, Clone)]
pub struct ListFilter {
    pub created_by: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub deleted: bool,
    pub tags: Vec<String>,
    pub query: Option<String>,
    /// A limit of zero returns no items but still computes the total count.
    pub limit: u32,
    pub offset: u64,
}

impl Default for ListFilter {
    fn default() -> Self {
        Self {
            created_by: None,
            from: None,
            to: None,
            deleted: false,
            tags: Vec::new(),
            query: None,
            limit: 20,
            offset: 0,
        }
    }
}

/// Relational catalog of packages and their child record sets. Each child
/// table is keyed by the owning package; files are additionally unique on
/// `(package_key, file_name)`.
pub struct PackageStore {
    db_path: PathBuf,
}

impl PackageStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    fn get_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS data_packages (
                key TEXT PRIMARY KEY,
                doi TEXT,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                license TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                deleted TEXT,
                size INTEGER NOT NULL,
                checksum TEXT NOT NULL,
                citation TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_data_packages_doi ON data_packages(doi)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS package_files (
                package_key TEXT NOT NULL,
                file_name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                size INTEGER NOT NULL,
                UNIQUE (package_key, file_name),
                FOREIGN KEY (package_key) REFERENCES data_packages(key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS package_creators (
                package_key TEXT NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                affiliations TEXT NOT NULL,
                identifier TEXT,
                identifier_scheme TEXT,
                scheme_uri TEXT,
                FOREIGN KEY (package_key) REFERENCES data_packages(key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS package_tags (
                package_key TEXT NOT NULL,
                value TEXT NOT NULL,
                FOREIGN KEY (package_key) REFERENCES data_packages(key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS package_identifiers (
                package_key TEXT NOT NULL,
                identifier TEXT NOT NULL,
                identifier_type TEXT NOT NULL,
                relation_type TEXT NOT NULL,
                FOREIGN KEY (package_key) REFERENCES data_packages(key)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_package_identifiers_value
             ON package_identifiers(identifier, relation_type)",
            [],
        )?;

        Ok(())
    }

    /// Insert a package and all of its child rows in one transaction.
    pub fn create(&self, pkg: &DataPackage) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO data_packages (
                key, doi, title, description, license, created_by,
                created, modified, deleted, size, checksum, citation
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                pkg.key,
                pkg.doi.as_ref().map(|d| d.to_string()),
                pkg.title,
                pkg.description,
                pkg.license.as_str(),
                pkg.created_by,
                format_ts(&pkg.created),
                format_ts(&pkg.modified),
                pkg.deleted.as_ref().map(format_ts),
                pkg.size as i64,
                pkg.checksum,
                pkg.citation,
            ],
        )?;

        insert_children(&tx, pkg)?;
        tx.commit()?;
        Ok(())
    }

    /// Apply an update: creators, tags and related identifiers are always
    /// replaced wholesale; files follow the update mode (APPEND removes
    /// only name collisions, OVERWRITE removes everything). `pkg.files`
    /// must contain only the newly stored files.
    pub fn update(&self, pkg: &DataPackage, mode: UpdateMode) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM data_packages WHERE key = ?1)",
            [&pkg.key],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(SeedbankError::NotFound(format!("package {}", pkg.key)));
        }

        tx.execute(
            "DELETE FROM package_creators WHERE package_key = ?1",
            [&pkg.key],
        )?;
        tx.execute(
            "DELETE FROM package_tags WHERE package_key = ?1",
            [&pkg.key],
        )?;
        tx.execute(
            "DELETE FROM package_identifiers WHERE package_key = ?1",
            [&pkg.key],
        )?;

        match mode {
            UpdateMode::Overwrite => {
                tx.execute(
                    "DELETE FROM package_files WHERE package_key = ?1",
                    [&pkg.key],
                )?;
            }
            UpdateMode::Append => {
                for file in &pkg.files {
                    tx.execute(
                        "DELETE FROM package_files WHERE package_key = ?1 AND file_name = ?2",
                        params![pkg.key, file.file_name],
                    )?;
                }
            }
        }

        tx.execute(
            "UPDATE data_packages SET
                doi = ?2, title = ?3, description = ?4, license = ?5,
                modified = ?6, size = ?7, checksum = ?8, citation = ?9
             WHERE key = ?1",
            params![
                pkg.key,
                pkg.doi.as_ref().map(|d| d.to_string()),
                pkg.title,
                pkg.description,
                pkg.license.as_str(),
                format_ts(&pkg.modified),
                pkg.size as i64,
                pkg.checksum,
                pkg.citation,
            ],
        )?;

        insert_children(&tx, pkg)?;
        tx.commit()?;
        Ok(())
    }

    /// Point lookup by package key; absence is a normal empty result.
    pub fn get(&self, key: &str) -> Result<Option<DataPackage>> {
        let conn = self.get_conn()?;
        self.get_with_conn(&conn, key)
    }

    pub fn get_by_doi(&self, doi: &Doi) -> Result<Option<DataPackage>> {
        let conn = self.get_conn()?;
        let key: Option<String> = conn
            .query_row(
                "SELECT key FROM data_packages WHERE doi = ?1",
                [doi.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match key {
            Some(key) => self.get_with_conn(&conn, &key),
            None => Ok(None),
        }
    }

    /// Look a package up by one of its alternative identifier values.
    pub fn get_by_alternative_identifier(&self, identifier: &str) -> Result<Option<DataPackage>> {
        let conn = self.get_conn()?;
        let key: Option<String> = conn
            .query_row(
                "SELECT p.key FROM data_packages p
                 JOIN package_identifiers i ON i.package_key = p.key
                 WHERE i.relation_type = ?1 AND i.identifier = ?2 AND p.deleted IS NULL
                 LIMIT 1",
                params![RelationType::IsAlternativeOf.as_str(), identifier],
                |row| row.get(0),
            )
            .optional()?;

        match key {
            Some(key) => self.get_with_conn(&conn, &key),
            None => Ok(None),
        }
    }

    /// Whether any other non-deleted package already owns this value as an
    /// `IsAlternativeOf` identifier.
    pub fn is_alternative_identifier_in_use(
        &self,
        identifier: &str,
        excluding_key: Option<&str>,
    ) -> Result<bool> {
        let conn = self.get_conn()?;
        let in_use: bool = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM package_identifiers i
                JOIN data_packages p ON p.key = i.package_key
                WHERE i.relation_type = ?1
                  AND i.identifier = ?2
                  AND p.deleted IS NULL
                  AND (?3 IS NULL OR p.key <> ?3)
             )",
            params![
                RelationType::IsAlternativeOf.as_str(),
                identifier,
                excluding_key,
            ],
            |row| row.get(0),
        )?;
        Ok(in_use)
    }

    /// Filtered, paginated listing. Returns the page plus the total count
    /// over the whole filtered set.
    pub fn list(&self, filter: &ListFilter) -> Result<(Vec<DataPackage>, u64)> {
        let conn = self.get_conn()?;

        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if filter.deleted {
            clauses.push("p.deleted IS NOT NULL".to_string());
        } else {
            clauses.push("p.deleted IS NULL".to_string());
        }

        if let Some(user) = &filter.created_by {
            values.push(Value::Text(user.clone()));
            clauses.push(format!("p.created_by = ?{}", values.len()));
        }
        if let Some(from) = &filter.from {
            values.push(Value::Text(format_ts(from)));
            clauses.push(format!("p.created >= ?{}", values.len()));
        }
        if let Some(to) = &filter.to {
            values.push(Value::Text(format_ts(to)));
            clauses.push(format!("p.created <= ?{}", values.len()));
        }
        if let Some(query) = &filter.query {
            let pattern = format!("%{}%", query);
            values.push(Value::Text(pattern.clone()));
            let title_idx = values.len();
            values.push(Value::Text(pattern));
            clauses.push(format!(
                "(p.title LIKE ?{} OR p.description LIKE ?{})",
                title_idx,
                values.len()
            ));
        }
        if !filter.tags.is_empty() {
            let mut placeholders = Vec::new();
            for tag in &filter.tags {
                values.push(Value::Text(tag.clone()));
                placeholders.push(format!("?{}", values.len()));
            }
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM package_tags t
                 WHERE t.package_key = p.key AND t.value IN ({}))",
                placeholders.join(", ")
            ));
        }

        let where_clause = format!("WHERE {}", clauses.join(" AND "));

        let count_sql = format!("SELECT COUNT(*) FROM data_packages p {}", where_clause);
        let total: i64 = conn.query_row(&count_sql, params_from_iter(values.iter()), |row| {
            row.get(0)
        })?;

        if filter.limit == 0 {
            return Ok((Vec::new(), total as u64));
        }

        let mut page_values = values.clone();
        page_values.push(Value::Integer(filter.limit as i64));
        let limit_idx = page_values.len();
        page_values.push(Value::Integer(filter.offset as i64));
        let page_sql = format!(
            "SELECT p.key FROM data_packages p {}
             ORDER BY p.created DESC, p.key DESC
             LIMIT ?{} OFFSET ?{}",
            where_clause,
            limit_idx,
            page_values.len()
        );

        let mut stmt = conn.prepare(&page_sql)?;
        let keys = stmt
            .query_map(params_from_iter(page_values.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(pkg) = self.get_with_conn(&conn, &key)? {
                items.push(pkg);
            }
        }

        Ok((items, total as u64))
    }

    /// Hard removal of a package and all child rows. Absent rows are
    /// tolerated so delete stays idempotent.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM package_files WHERE package_key = ?1", [key])?;
        tx.execute("DELETE FROM package_creators WHERE package_key = ?1", [key])?;
        tx.execute("DELETE FROM package_tags WHERE package_key = ?1", [key])?;
        tx.execute(
            "DELETE FROM package_identifiers WHERE package_key = ?1",
            [key],
        )?;
        tx.execute("DELETE FROM data_packages WHERE key = ?1", [key])?;

        tx.commit()?;
        Ok(())
    }

    /// Soft delete: sets the deleted timestamp, leaving rows and blobs in
    /// place. Already-archived packages are left untouched.
    pub fn archive(&self, key: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE data_packages SET deleted = ?1 WHERE key = ?2 AND deleted IS NULL",
            params![format_ts(&Utc::now()), key],
        )?;

        if affected == 0 {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM data_packages WHERE key = ?1)",
                [key],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(SeedbankError::NotFound(format!("package {}", key)));
            }
        }

        Ok(())
    }

    fn get_with_conn(&self, conn: &Connection, key: &str) -> Result<Option<DataPackage>> {
        let row = conn
            .query_row(
                "SELECT doi, title, description, license, created_by,
                        created, modified, deleted, size, checksum, citation
                 FROM data_packages WHERE key = ?1",
                [key],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, i64>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, Option<String>>(10)?,
                    ))
                },
            )
            .optional()?;

        let Some((
            doi,
            title,
            description,
            license,
            created_by,
            created,
            modified,
            deleted,
            size,
            checksum,
            citation,
        )) = row
        else {
            return Ok(None);
        };

        let doi = doi.map(|d| Doi::parse(&d)).transpose()?;
        let license = License::parse(&license)?;
        let created = parse_ts(&created)?;
        let modified = parse_ts(&modified)?;
        let deleted = deleted.map(|d| parse_ts(&d)).transpose()?;

        let mut pkg = DataPackage {
            key: key.to_string(),
            doi,
            title,
            description,
            license,
            created_by,
            created,
            modified,
            deleted,
            size: size as u64,
            checksum,
            citation,
            files: Vec::new(),
            creators: Vec::new(),
            tags: Vec::new(),
            related_identifiers: Vec::new(),
        };

        self.load_children(conn, &mut pkg)?;
        Ok(Some(pkg))
    }

    fn load_children(&self, conn: &Connection, pkg: &mut DataPackage) -> Result<()> {
        let mut stmt = conn.prepare(
            "SELECT file_name, checksum, size FROM package_files
             WHERE package_key = ?1 ORDER BY file_name",
        )?;
        pkg.files = stmt
            .query_map([&pkg.key], |row| {
                Ok(DataPackageFile {
                    file_name: row.get(0)?,
                    checksum: row.get(1)?,
                    size: row.get::<_, i64>(2)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT name, affiliations, identifier, identifier_scheme, scheme_uri
             FROM package_creators WHERE package_key = ?1 ORDER BY position",
        )?;
        pkg.creators = stmt
            .query_map([&pkg.key], |row| {
                let affiliations_json: String = row.get(1)?;
                let affiliations: Vec<String> = serde_json::from_str(&affiliations_json)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?;
                let scheme: Option<String> = row.get(3)?;
                let identifier_scheme = scheme
                    .map(|s| {
                        IdentifierScheme::parse(&s).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
                        })
                    })
                    .transpose()?;
                Ok(Creator {
                    name: row.get(0)?,
                    affiliations,
                    identifier: row.get(2)?,
                    identifier_scheme,
                    scheme_uri: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT value FROM package_tags WHERE package_key = ?1 ORDER BY rowid",
        )?;
        pkg.tags = stmt
            .query_map([&pkg.key], |row| Ok(Tag { value: row.get(0)? }))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT identifier, identifier_type, relation_type
             FROM package_identifiers WHERE package_key = ?1 ORDER BY rowid",
        )?;
        pkg.related_identifiers = stmt
            .query_map([&pkg.key], |row| {
                let identifier_type: String = row.get(1)?;
                let relation_type: String = row.get(2)?;
                Ok(RelatedIdentifier {
                    identifier: row.get(0)?,
                    identifier_type: IdentifierType::parse(&identifier_type).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e))
                    })?,
                    relation_type: RelationType::parse(&relation_type).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e))
                    })?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(())
    }
}

fn insert_children(tx: &Transaction<'_>, pkg: &DataPackage) -> Result<()> {
    for file in &pkg.files {
        tx.execute(
            "INSERT INTO package_files (package_key, file_name, checksum, size)
             VALUES (?1, ?2, ?3, ?4)",
            params![pkg.key, file.file_name, file.checksum, file.size as i64],
        )?;
    }

    for tag in &pkg.tags {
        tx.execute(
            "INSERT INTO package_tags (package_key, value) VALUES (?1, ?2)",
            params![pkg.key, tag.value],
        )?;
    }

    for (position, creator) in pkg.creators.iter().enumerate() {
        tx.execute(
            "INSERT INTO package_creators (
                package_key, position, name, affiliations,
                identifier, identifier_scheme, scheme_uri
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                pkg.key,
                position as i64,
                creator.name,
                serde_json::to_string(&creator.affiliations)?,
                creator.identifier,
                creator.identifier_scheme.map(|s| s.as_str()),
                creator.scheme_uri,
            ],
        )?;
    }

    for identifier in &pkg.related_identifiers {
        tx.execute(
            "INSERT INTO package_identifiers (
                package_key, identifier, identifier_type, relation_type
            ) VALUES (?1, ?2, ?3, ?4)",
            params![
                pkg.key,
                identifier.identifier,
                identifier.identifier_type.as_str(),
                identifier.relation_type.as_str(),
            ],
        )?;
    }

    Ok(())
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SeedbankError::Fatal(format!("corrupt timestamp in catalog: {}", e)))
}
