pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_documents.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_documents.sql")),
				"tables/002_shared_groups.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_shared_groups.sql")),
				"tables/003_shared_group_documents.sql" => out
					.push_str(include_str!("../../../sql/tables/003_shared_group_documents.sql")),
				"tables/004_jobs.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_jobs.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
