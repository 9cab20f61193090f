// ============================================================================
// SProx - 复合表达式求值器
// ============================================================================
//
// 文件: src/core/compound.rs
// 职责: 布尔组合目标表达式的词法切分与集合代数求值
// 边界:
//   - ✅ 运算符 / 括号 / 操作数的词法识别
//   - ✅ 语法校验（前导运算符、相邻运算符、括号不平衡等）
//   - ✅ 基于运算符栈的优先级求值（not > and > or）
//   - ✅ 隐式 and 插入（`A not B` 等价于 `A and not B`）
//   - ❌ 不应包含具体匹配引擎（由调用方提供操作数求值）
//   - ❌ 不应拼接字符串再动态求值
//
// ============================================================================

use super::matcher::Matches;
use super::resolver::ResolveError;

/// 复合表达式中的词
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    And,
    Or,
    Not,
    LParen,
    RParen,
    Operand(String),
}

impl Token {
    /// 识别单个词；括号必须独立成词
    pub fn from_word(word: &str) -> Self {
        match word {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "(" => Token::LParen,
            ")" => Token::RParen,
            other => Token::Operand(other.to_string()),
        }
    }

    fn text(&self) -> &str {
        match self {
            Token::And => "and",
            Token::Or => "or",
            Token::Not => "not",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::Operand(word) => word,
        }
    }
}

/// 栈上的运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    And,
    Or,
    Not,
    LParen,
}

impl Operator {
    fn precedence(&self) -> u8 {
        match self {
            Operator::Not => 3,
            Operator::And => 2,
            Operator::Or => 1,
            Operator::LParen => 0,
        }
    }
}

/// 当前期望的下一个词类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Operand,
    Operator,
}

/// 把词序列切分为 token
pub fn tokenize<S: AsRef<str>>(words: &[S]) -> Vec<Token> {
    words.iter().map(|word| Token::from_word(word.as_ref())).collect()
}

/// 复合表达式求值器
///
/// 操作数由调用方通过闭包求值为池位置集合，求值器只负责集合代数。
/// `universe` 用于 `not` 取补集。
pub struct CompoundEvaluator<'u> {
    universe: &'u Matches,
    operators: Vec<Operator>,
    operands: Vec<Matches>,
}

impl<'u> CompoundEvaluator<'u> {
    pub fn new(universe: &'u Matches) -> Self {
        Self {
            universe,
            operators: Vec::new(),
            operands: Vec::new(),
        }
    }

    /// 求值整个 token 序列
    pub fn evaluate<F>(mut self, tokens: &[Token], mut operand: F) -> Result<Matches, ResolveError>
    where
        F: FnMut(&str) -> Result<Matches, ResolveError>,
    {
        if tokens.is_empty() {
            return Err(ResolveError::EmptyExpression);
        }

        let mut expect = Expect::Operand;

        for token in tokens {
            match token {
                Token::And | Token::Or => {
                    if expect == Expect::Operand {
                        return Err(ResolveError::UnexpectedOperator(token.text().to_string()));
                    }
                    let op = if *token == Token::And {
                        Operator::And
                    } else {
                        Operator::Or
                    };
                    self.push_binary(op)?;
                    expect = Expect::Operand;
                }
                Token::Not => {
                    // `A not B` 补一个 and
                    if expect == Expect::Operator {
                        self.push_binary(Operator::And)?;
                    }
                    self.operators.push(Operator::Not);
                    expect = Expect::Operand;
                }
                Token::LParen => {
                    if expect == Expect::Operator {
                        return Err(ResolveError::MissingOperator(token.text().to_string()));
                    }
                    self.operators.push(Operator::LParen);
                }
                Token::RParen => {
                    if expect == Expect::Operand {
                        return Err(ResolveError::UnexpectedToken(token.text().to_string()));
                    }
                    self.close_group()?;
                }
                Token::Operand(word) => {
                    if expect == Expect::Operator {
                        return Err(ResolveError::MissingOperator(word.clone()));
                    }
                    let matched = operand(word)?;
                    self.operands.push(matched);
                    expect = Expect::Operator;
                }
            }
        }

        if expect == Expect::Operand {
            let last = tokens.last().map(Token::text).unwrap_or_default();
            return Err(ResolveError::TrailingOperator(last.to_string()));
        }

        while let Some(op) = self.operators.pop() {
            if op == Operator::LParen {
                return Err(ResolveError::UnbalancedParentheses);
            }
            self.apply(op)?;
        }

        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(ResolveError::UnbalancedParentheses),
        }
    }

    /// 压入二元运算符前先归约优先级不低于它的运算符（左结合）
    fn push_binary(&mut self, op: Operator) -> Result<(), ResolveError> {
        while let Some(&top) = self.operators.last() {
            if top == Operator::LParen || top.precedence() < op.precedence() {
                break;
            }
            self.operators.pop();
            self.apply(top)?;
        }
        self.operators.push(op);
        Ok(())
    }

    /// 归约到最近的左括号
    fn close_group(&mut self) -> Result<(), ResolveError> {
        loop {
            match self.operators.pop() {
                Some(Operator::LParen) => return Ok(()),
                Some(op) => self.apply(op)?,
                None => return Err(ResolveError::UnbalancedParentheses),
            }
        }
    }

    fn apply(&mut self, op: Operator) -> Result<(), ResolveError> {
        let result = match op {
            Operator::Not => {
                let operand = self.pop_operand()?;
                self.universe.difference(&operand).copied().collect()
            }
            Operator::And => {
                let right = self.pop_operand()?;
                let left = self.pop_operand()?;
                left.intersection(&right).copied().collect()
            }
            Operator::Or => {
                let right = self.pop_operand()?;
                let mut left = self.pop_operand()?;
                left.extend(right);
                left
            }
            Operator::LParen => return Err(ResolveError::UnbalancedParentheses),
        };
        self.operands.push(result);
        Ok(())
    }

    fn pop_operand(&mut self) -> Result<Matches, ResolveError> {
        self.operands.pop().ok_or(ResolveError::UnbalancedParentheses)
    }
}

/// 便捷入口：切分并求值
pub fn evaluate<S, F>(words: &[S], universe: &Matches, operand: F) -> Result<Matches, ResolveError>
where
    S: AsRef<str>,
    F: FnMut(&str) -> Result<Matches, ResolveError>,
{
    let tokens = tokenize(words);
    CompoundEvaluator::new(universe).evaluate(&tokens, operand)
}
