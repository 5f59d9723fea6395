//! Static misspelling table for the auto-fixer's synonym rule.
//!
//! Built once from the catalog. Every key maps straight to a canonical name
//! and no key is itself a canonical name, so one pass over a text resolves
//! everything the table knows about.

use std::collections::HashMap;

use crate::catalog::Catalog;

/// Near-miss spellings seen in model output that no derivation rule covers.
const CURATED: &[(&str, &str)] = &[
    ("SqlDatabase", "SQLDatabases"),
    ("SQLDatabase", "SQLDatabases"),
    ("SqlServer", "SQLServers"),
    ("SQLServer", "SQLServers"),
    ("SQLManagedInstance", "SQLManagedInstances"),
    ("PublicIPAddress", "PublicIpAddresses"),
    ("PublicIPAddresses", "PublicIpAddresses"),
    ("PublicIp", "PublicIpAddresses"),
    ("ContainerRegistry", "ContainerRegistries"),
    ("NetworkSecurityGroup", "NetworkSecurityGroups"),
    ("NSG", "NetworkSecurityGroups"),
    ("DataLake", "DataLakeStorage"),
    ("DataLakes", "DataLakeStorage"),
    ("KeyVault", "KeyVaults"),
    ("AppService", "AppServices"),
    ("FunctionApp", "FunctionApps"),
    ("Functions", "FunctionApps"),
    ("AzureFunctions", "FunctionApps"),
    ("CosmosDB", "CosmosDb"),
    ("Cosmos", "CosmosDb"),
    ("Redis", "CacheForRedis"),
    ("PostgreSQL", "DatabaseForPostgresqlServers"),
    ("MySQL", "DatabaseForMysqlServers"),
    ("ApiManagement", "APIManagement"),
    ("APIM", "APIManagement"),
    ("EventGrid", "EventGridTopics"),
    ("VirtualNetwork", "VirtualNetworks"),
    ("VNet", "VirtualNetworks"),
    ("LoadBalancer", "LoadBalancers"),
    ("StorageAccount", "StorageAccounts"),
    ("LogicApp", "LogicApps"),
    ("AppServicePlan", "AppServicePlans"),
    ("ServiceBusQueue", "ServiceBus"),
];

/// Ordered misspelling -> canonical mapping.
#[derive(Debug, Clone, Default)]
pub struct CorrectionTable {
    pairs: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl CorrectionTable {
    /// Derive the table from a catalog.
    ///
    /// Sources, in priority order: catalog aliases, the curated list, then
    /// singular and over-pluralized forms of every canonical name.
    pub fn derive(catalog: &Catalog) -> Self {
        let mut table = Self::default();

        for entry in catalog.entries() {
            for alias in &entry.aliases {
                table.insert(catalog, alias, &entry.canonical_name);
            }
        }

        for (misspelling, canonical) in CURATED {
            if catalog.lookup_canonical(canonical).is_some() {
                table.insert(catalog, misspelling, canonical);
            }
        }

        for entry in catalog.entries() {
            let name = &entry.canonical_name;
            if let Some(singular) = singular_form(name) {
                table.insert(catalog, &singular, name);
            }
            table.insert(catalog, &format!("{}s", name), name);
        }

        debug_assert!(table.is_closed());
        table
    }

    fn insert(&mut self, catalog: &Catalog, misspelling: &str, canonical: &str) {
        if misspelling.is_empty()
            || misspelling == canonical
            || catalog.lookup_canonical(misspelling).is_some()
            || self.index.contains_key(misspelling)
        {
            return;
        }
        self.index.insert(misspelling.to_string(), self.pairs.len());
        self.pairs.push((misspelling.to_string(), canonical.to_string()));
    }

    /// Canonical replacement for a misspelling.
    pub fn get(&self, misspelling: &str) -> Option<&str> {
        self.index
            .get(misspelling)
            .map(|&i| self.pairs[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs in priority order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// No replacement is itself a key, so applying the table is one-shot.
    pub fn is_closed(&self) -> bool {
        self.pairs.iter().all(|(_, v)| !self.index.contains_key(v))
    }
}

/// Singular form of a plural name, if it looks plural.
fn singular_form(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix("ies") {
        return (!stem.is_empty()).then(|| format!("{}y", stem));
    }
    if name.ends_with("sses") || name.ends_with("xes") {
        return name.strip_suffix("es").map(str::to_string);
    }
    if name.ends_with("ss") || name.ends_with("us") {
        return None;
    }
    name.strip_suffix('s')
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CorrectionTable {
        Catalog::builtin().unwrap().correction_table()
    }

    #[test]
    fn test_singular_form() {
        assert_eq!(singular_form("ContainerRegistries").as_deref(), Some("ContainerRegistry"));
        assert_eq!(singular_form("PublicIpAddresses").as_deref(), Some("PublicIpAddress"));
        assert_eq!(singular_form("KeyVaults").as_deref(), Some("KeyVault"));
        assert_eq!(singular_form("ServiceBus"), None);
        assert_eq!(singular_form("VM"), None);
    }

    #[test]
    fn test_aliases_and_derived_forms() {
        let table = table();
        assert_eq!(table.get("ACR"), Some("ContainerRegistries"));
        assert_eq!(table.get("FrontDoor"), Some("FrontDoors"));
        assert_eq!(table.get("KeyVault"), Some("KeyVaults"));
        assert_eq!(table.get("AppServicess"), Some("AppServices"));
        assert_eq!(table.get("DataLakeStorages"), Some("DataLakeStorage"));
        assert_eq!(table.get("SqlDatabase"), Some("SQLDatabases"));
    }

    #[test]
    fn test_canonical_names_never_keys() {
        let catalog = Catalog::builtin().unwrap();
        let table = catalog.correction_table();
        for entry in catalog.entries() {
            assert!(table.get(&entry.canonical_name).is_none(), "{}", entry.canonical_name);
        }
        // Both spellings are real components.
        assert!(table.get("Tag").is_none());
        assert!(table.get("Tags").is_none());
    }

    #[test]
    fn test_table_is_closed() {
        let table = table();
        assert!(!table.is_empty());
        assert!(table.is_closed());
        for (_, canonical) in table.iter() {
            assert!(table.get(canonical).is_none());
        }
    }
}
