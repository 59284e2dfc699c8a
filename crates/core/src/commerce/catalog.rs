use rust_decimal::Decimal;

use crate::domain::product::{Product, ProductId, Supplier};

/// Synchronous, side-effect free product lookup.
pub trait CatalogLookup: Send + Sync {
    /// Case-insensitive substring match on product names. An empty query
    /// yields no results.
    fn search(&self, query: &str) -> Vec<Product>;

    fn find(&self, product_id: &ProductId) -> Option<Product>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticCatalog {
    products: Vec<Product>,
}

impl StaticCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self { products }
    }

    /// Electronics catalog used by the demo binary.
    pub fn demo() -> Self {
        let entries: &[(&str, &str, &str, &[(&str, i64)])] = &[
            ("prod_macbook_pro", "MacBook Pro 14\"", "macbookpro", &[("e-Retailer", 1999), ("DirectSource", 1949), ("TechGiant", 2010)]),
            ("prod_macbook_air", "MacBook Air 13\"", "macbookair", &[("e-Retailer", 999), ("DirectSource", 979)]),
            ("prod_surface", "Microsoft Surface Pro 9", "surface", &[("e-Retailer", 1299), ("PCWorld", 1259), ("DirectSource", 1289)]),
            ("prod_dell_xps", "Dell XPS 15 Laptop", "dellxps", &[("DirectSource", 1599), ("PCWorld", 1549)]),
            ("prod_ipad_air", "iPad Air", "ipadair", &[("TechGiant", 799), ("e-Retailer", 789)]),
            ("prod_galaxy_tab", "Samsung Galaxy Tab S9", "galaxytab", &[("e-Retailer", 899), ("DirectSource", 879)]),
            ("prod_iphone_15", "iPhone 15 Pro", "iphone15", &[("e-Retailer", 999), ("TechGiant", 1019)]),
            ("prod_pixel_8", "Google Pixel 8 Pro", "pixel8", &[("DirectSource", 899), ("e-Retailer", 889)]),
            ("prod_apple_watch", "Apple Watch Ultra 2", "applewatch", &[("TechGiant", 799)]),
            ("prod_galaxy_watch", "Samsung Galaxy Watch 6", "galaxywatch", &[("e-Retailer", 399), ("DirectSource", 379)]),
            ("prod_sony_headphones", "Sony WH-1000XM5 Headphones", "sonywh", &[("e-Retailer", 349), ("AudioPhile", 329)]),
            ("prod_bose_headphones", "Bose QuietComfort Ultra", "boseqc", &[("AudioPhile", 429), ("e-Retailer", 419)]),
            ("prod_airpods_pro", "Apple AirPods Pro (2nd Gen)", "airpodspro", &[("TechGiant", 249), ("e-Retailer", 239)]),
            ("prod_tv_lg_c3", "LG 65\" Class C3 Series OLED 4K TV", "lgtvc3", &[("e-Retailer", 1599), ("DirectSource", 1579)]),
            ("prod_tv_samsung_qled", "Samsung 75\" Class QN90C Neo QLED 4K TV", "samsungtv", &[("DirectSource", 2199)]),
            ("prod_soundbar_sonos", "Sonos Arc Soundbar", "sonosarc", &[("AudioPhile", 899), ("e-Retailer", 889)]),
            ("prod_ps5", "PlayStation 5 Console", "ps5", &[("GameStop", 499), ("e-Retailer", 509)]),
            ("prod_xbox", "Xbox Series X Console", "xbox", &[("GameStop", 499), ("DirectSource", 489)]),
            ("prod_switch", "Nintendo Switch OLED", "switch", &[("GameStop", 349)]),
        ];

        let products = entries
            .iter()
            .map(|(id, name, seed, suppliers)| Product {
                id: ProductId((*id).to_string()),
                name: (*name).to_string(),
                image: format!("https://picsum.photos/seed/{seed}/200/200"),
                suppliers: suppliers
                    .iter()
                    .map(|(supplier, price)| Supplier::new(*supplier, Decimal::from(*price)))
                    .collect(),
            })
            .collect();

        Self::new(products)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl CatalogLookup for StaticCatalog {
    fn search(&self, query: &str) -> Vec<Product> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        self.products
            .iter()
            .filter(|product| product.name.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    fn find(&self, product_id: &ProductId) -> Option<Product> {
        self.products.iter().find(|product| &product.id == product_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{CatalogLookup, StaticCatalog};
    use crate::domain::product::ProductId;

    #[test]
    fn search_is_case_insensitive_substring_match() {
        let catalog = StaticCatalog::demo();
        let watches = catalog.search("WATCH");
        let ids: Vec<&str> = watches.iter().map(|product| product.id.as_str()).collect();

        assert_eq!(ids, vec!["prod_apple_watch", "prod_galaxy_watch"]);
    }

    #[test]
    fn empty_query_yields_no_results() {
        assert!(StaticCatalog::demo().search("").is_empty());
    }

    #[test]
    fn unknown_query_is_an_empty_list_not_an_error() {
        assert!(StaticCatalog::demo().search("toaster").is_empty());
    }

    #[test]
    fn every_demo_product_has_a_supplier() {
        let catalog = StaticCatalog::demo();
        assert_eq!(catalog.len(), 19);
        assert!(catalog.find(&ProductId("prod_ps5".to_string())).is_some());
        assert!(catalog.search("o").iter().all(|product| !product.suppliers.is_empty()));
    }
}
