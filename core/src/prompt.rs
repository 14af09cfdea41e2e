use crate::platform::TenantContext;

pub const PERSONA: &str = "\
You are Duplo Dash, a helpful assistant focused on reducing cost by managing resources: \
stopping them when not in use and starting them when needed.
Only introduce yourself if the user greets you; do not volunteer other information until asked.";

const EXACT_ECHO: &str = "\
Repeat the resource list exactly as provided, without adding or removing anything. \
Do not change punctuation, casing, or formatting.";

/// Extra context chosen by what the request turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextBlock {
    TenantDetails,
    Listing { running: bool, rendered: String },
    StopInProgress { rendered: String },
    StartInProgress { rendered: String },
    NotFound,
}

pub fn system_prompt(tenant: Option<&TenantContext>, block: Option<&ContextBlock>) -> String {
    let mut prompt = String::from(PERSONA);
    let Some(block) = block else {
        return prompt;
    };
    let tenant_name = tenant.map(|t| t.tenant_name.as_str()).unwrap_or("");

    prompt.push_str("\n\n");
    match block {
        ContextBlock::TenantDetails => {
            let (id, name, url) = tenant
                .map(|t| (t.tenant_id.as_str(), t.tenant_name.as_str(), t.host_url.as_str()))
                .unwrap_or(("unknown", "unknown", "unknown"));
            prompt.push_str(&format!(
                "Here are the details for the current context:\n\
                 Tenant ID: {}\n\
                 Tenant Name: {}\n\
                 Platform URL: {}\n\n\
                 You can answer questions about:\n\
                 1. Tenant information (ID, name)\n\
                 2. Platform details (URL)\n\
                 3. Resource states and configurations\n\n\
                 When answering questions about tenant or platform details, use the stored information above.",
                id, name, url
            ));
        }
        ContextBlock::Listing { running, rendered } => {
            let which = if *running { "running" } else { "stopped" };
            prompt.push_str(&format!(
                "The {} resources in tenant {} are:\n{}\n\n{}",
                which, tenant_name, rendered, EXACT_ECHO
            ));
        }
        ContextBlock::StopInProgress { rendered } => {
            prompt.push_str(&format!(
                "These resources in tenant {} have been asked to stop; it will take some time for them to stop:\n{}\n\n{}",
                tenant_name, rendered, EXACT_ECHO
            ));
        }
        ContextBlock::StartInProgress { rendered } => {
            prompt.push_str(&format!(
                "These resources in tenant {} have been asked to start; it will take some time for them to start:\n{}\n\n{}",
                tenant_name, rendered, EXACT_ECHO
            ));
        }
        ContextBlock::NotFound => {
            prompt.push_str("I couldn't find any resource that matches your query.");
        }
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> TenantContext {
        TenantContext::new("https://portal.example", "t-1", "acme")
    }

    #[test]
    fn persona_only_without_a_block() {
        assert_eq!(system_prompt(Some(&acme()), None), PERSONA);
    }

    #[test]
    fn tenant_block_names_id_name_and_url() {
        let prompt = system_prompt(Some(&acme()), Some(&ContextBlock::TenantDetails));
        assert!(prompt.starts_with(PERSONA));
        assert!(prompt.contains("Tenant ID: t-1"));
        assert!(prompt.contains("Tenant Name: acme"));
        assert!(prompt.contains("Platform URL: https://portal.example"));
    }

    #[test]
    fn listing_and_progress_blocks_carry_the_rendering() {
        let rendered = "\nRDS\n  - db1: available".to_string();
        let listing = system_prompt(
            Some(&acme()),
            Some(&ContextBlock::Listing { running: true, rendered: rendered.clone() }),
        );
        assert!(listing.contains("The running resources in tenant acme are:"));
        assert!(listing.contains("db1: available"));

        let stopping = system_prompt(
            Some(&acme()),
            Some(&ContextBlock::StopInProgress { rendered: "db1: stopping".into() }),
        );
        assert!(stopping.contains("asked to stop"));
        assert!(!stopping.contains("asked to start"));

        let starting = system_prompt(
            Some(&acme()),
            Some(&ContextBlock::StartInProgress { rendered: "db1: starting".into() }),
        );
        assert!(starting.contains("asked to start"));
    }

    #[test]
    fn not_found_block() {
        let prompt = system_prompt(Some(&acme()), Some(&ContextBlock::NotFound));
        assert!(prompt.ends_with("I couldn't find any resource that matches your query."));
    }
}
