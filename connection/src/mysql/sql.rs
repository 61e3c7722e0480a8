//! MySQL 语句拼接。标识符统一用反引号包裹，值全部走占位符绑定

use common::err::scaling_error::ReError;
use common::err::CResult;

/// `name` -> `` `name` ``，`db.t` -> `` `db`.`t` ``
pub fn quote_identifier(name: &str) -> String {
    name.split('.')
        .map(|part| format!("`{}`", part.replace('`', "``")))
        .collect::<Vec<_>>()
        .join(".")
}

fn quote_list(columns: &[String]) -> String {
    columns.iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub fn count_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_identifier(table))
}

/// 按主键升序的分页查询。has_after 为 true 时追加主键下界，绑定顺序为主键值、limit
pub fn scan_sql(table: &str, columns: Option<&[String]>, primary_key: &[String], has_after: bool) -> CResult<String> {
    if primary_key.is_empty() {
        return Err(ReError::String(format!("table {} has no primary key", table)));
    }

    let projection = match columns {
        Some(columns) if !columns.is_empty() => quote_list(columns),
        _ => "*".to_string(),
    };
    let keys = quote_list(primary_key);

    let mut sql = format!("SELECT {} FROM {}", projection, quote_identifier(table));
    if has_after {
        sql.push_str(&format!(" WHERE ({}) > ({})", keys, placeholders(primary_key.len())));
    }
    sql.push_str(&format!(" ORDER BY {} LIMIT ?", keys));

    Ok(sql)
}

/// 主键冲突时更新非主键列；所有列都是主键时忽略冲突
pub fn upsert_sql(table: &str, columns: &[String], primary_key: &[String]) -> CResult<String> {
    if columns.is_empty() {
        return Err(ReError::String(format!("empty row for table {}", table)));
    }

    let updates = columns.iter()
        .filter(|c| !primary_key.iter().any(|k| k.eq_ignore_ascii_case(c)))
        .map(|c| {
            let c = quote_identifier(c);
            format!("{} = VALUES({})", c, c)
        })
        .collect::<Vec<_>>();

    let insert = format!("INTO {} ({}) VALUES ({})",
        quote_identifier(table), quote_list(columns), placeholders(columns.len()));
    if updates.is_empty() {
        return Ok(format!("INSERT IGNORE {}", insert));
    }

    Ok(format!("INSERT {} ON DUPLICATE KEY UPDATE {}", insert, updates.join(", ")))
}

pub fn delete_sql(table: &str, primary_key: &[String]) -> CResult<String> {
    if primary_key.is_empty() {
        return Err(ReError::String(format!("table {} has no primary key", table)));
    }

    let conditions = primary_key.iter()
        .map(|k| format!("{} = ?", quote_identifier(k)))
        .collect::<Vec<_>>()
        .join(" AND ");

    Ok(format!("DELETE FROM {} WHERE {}", quote_identifier(table), conditions))
}

/// 主键列，按声明顺序
pub const PRIMARY_KEY_SQL: &str = "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
    WHERE TABLE_SCHEMA = COALESCE(?, DATABASE()) AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
    ORDER BY ORDINAL_POSITION";

/// `db.t` -> (Some(db), t)
pub fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) => (Some(schema), name),
        None => (None, table),
    }
}
