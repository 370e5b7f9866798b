use rusqlite::types::Value;

use social_types::Result;
use social_types::feed::FeedFilter;
use social_types::models::{FeedItem, Post};

use crate::posts::load_tags;
use crate::{Database, get_ts};

impl Database {
    /// Posts by accounts `requester_id` follows, filtered, sorted by
    /// creation time and paginated. The filter was validated when it was
    /// built; every user-supplied value here is a bound parameter and the
    /// sort keyword comes from a closed enum.
    pub async fn get_feed(&self, requester_id: i64, filter: &FeedFilter) -> Result<Vec<FeedItem>> {
        let (sql, params) = build_feed_query(requester_id, filter);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut items = stmt
                .query_map(rusqlite::params_from_iter(params), |row| {
                    Ok(FeedItem {
                        post: Post {
                            id: row.get(0)?,
                            title: row.get(1)?,
                            content: row.get(2)?,
                            author_id: row.get(3)?,
                            tags: Vec::new(),
                            version: row.get(4)?,
                            created_at: get_ts(row, 5)?,
                            updated_at: get_ts(row, 6)?,
                        },
                        author_name: row.get(7)?,
                        comment_count: row.get(8)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let ids: Vec<i64> = items.iter().map(|i| i.post.id).collect();
            let mut tags = load_tags(conn, &ids)?;
            for item in &mut items {
                item.post.tags = tags.remove(&item.post.id).unwrap_or_default();
            }

            Ok(items)
        })
        .await
    }
}

fn build_feed_query(requester_id: i64, filter: &FeedFilter) -> (String, Vec<Value>) {
    let mut params = vec![
        Value::Integer(requester_id),
        Value::Text(filter.search().to_string()),
    ];

    let mut sql = String::from(
        "SELECT p.id, p.title, p.content, p.author_id, p.version, p.created_at, p.updated_at,
                u.name,
                (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
         FROM posts p
         JOIN followers f ON f.target_id = p.author_id AND f.follower_id = ?1
         JOIN users u ON u.id = p.author_id
         WHERE (?2 = ''
                OR instr(fold_case(p.title), fold_case(?2)) > 0
                OR instr(fold_case(p.content), fold_case(?2)) > 0)",
    );

    let tags = filter.tags();
    if !tags.is_empty() {
        // Superset: every requested tag must be present on the post
        let first = params.len() + 1;
        let placeholders: Vec<String> = (first..first + tags.len())
            .map(|i| format!("?{}", i))
            .collect();
        params.extend(tags.iter().cloned().map(Value::Text));
        params.push(Value::Integer(tags.len() as i64));

        sql.push_str(&format!(
            "
           AND (SELECT COUNT(*) FROM post_tags t
                WHERE t.post_id = p.id AND t.tag IN ({})) = ?{}",
            placeholders.join(", "),
            params.len()
        ));
    }

    let dir = filter.sort().as_sql();
    params.push(Value::Integer(filter.limit()));
    params.push(Value::Integer(filter.offset()));
    sql.push_str(&format!(
        "
         ORDER BY p.created_at {dir}, p.id {dir}
         LIMIT ?{} OFFSET ?{}",
        params.len() - 1,
        params.len()
    ));

    (sql, params)
}
